//! Toolchain resolution.
//!
//! Turns a [`ToolchainSpec`] into a [`ToolchainBundle`] for one system:
//!
//! - **Pinned**: fetch the channel manifest, verify its SHA-256 against the
//!   pin, then require every component and target to be available.
//! - **Floating**: take the newest manifest of the channel; when it lacks a
//!   requested component or target, walk back one day at a time.
//!
//! Names the manifest has never heard of fail immediately in both modes.
//!
//! [`Resolver::extend`] adds components to an existing bundle from the very
//! manifest that bundle came from, so the shell can never move the package.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::platform::SystemId;
use crate::toolchain::manifest::{ChannelManifest, Lookup};
use crate::toolchain::source::ManifestSource;
use crate::toolchain::types::{Artifact, Channel, ToolchainBundle, ToolchainError, ToolchainSpec, ToolchainStrategy, manifest_path};
use crate::util::hash::hash_bytes;

/// Why a manifest could not satisfy a request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Gap {
  UnknownComponent(String),
  UnknownTarget(String),
  ComponentUnavailable(String),
  TargetUnavailable(String),
}

impl Gap {
  /// Gaps that no older manifest is going to fill.
  fn is_permanent(&self) -> bool {
    matches!(self, Gap::UnknownComponent(_) | Gap::UnknownTarget(_))
  }

  fn into_error(self, channel: &str, host: &str) -> ToolchainError {
    match self {
      Gap::UnknownComponent(component) | Gap::ComponentUnavailable(component) => {
        ToolchainError::UnsupportedComponent {
          component,
          channel: channel.to_string(),
          target: host.to_string(),
        }
      }
      Gap::UnknownTarget(target) | Gap::TargetUnavailable(target) => ToolchainError::UnsupportedTarget {
        target,
        channel: channel.to_string(),
      },
    }
  }
}

/// Cache of verified manifests, keyed by channel and content hash
/// (`<cache>/manifests/<channel>-<sha256>.toml`).
#[derive(Debug, Clone)]
pub struct ManifestCache {
  dir: PathBuf,
}

impl ManifestCache {
  pub fn new(cache_dir: &Path) -> Self {
    Self {
      dir: cache_dir.join("manifests"),
    }
  }

  fn path(&self, channel: &str, sha256: &str) -> PathBuf {
    self
      .dir
      .join(format!("{}-{}.toml", channel, sha256.to_ascii_lowercase()))
  }

  /// Return the cached bytes if present and still matching their hash.
  pub async fn get(&self, channel: &str, sha256: &str) -> Option<Vec<u8>> {
    let path = self.path(channel, sha256);
    let bytes = match tokio::fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
      Err(e) => {
        debug!(path = %path.display(), error = %e, "cannot read cached manifest");
        return None;
      }
    };
    let actual = hash_bytes(&bytes);
    if actual.matches(sha256) {
      Some(bytes)
    } else {
      warn!(path = %path.display(), expected = %sha256, actual = %actual, "cached manifest corrupted, ignoring");
      None
    }
  }

  pub async fn put(&self, channel: &str, sha256: &str, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&self.dir).await?;
    tokio::fs::write(self.path(channel, sha256), bytes).await
  }
}

/// Resolves toolchain requests against a distribution source.
pub struct Resolver<'a, S: ManifestSource> {
  source: &'a S,
  cache: ManifestCache,
}

impl<'a, S: ManifestSource> Resolver<'a, S> {
  pub fn new(source: &'a S, cache_dir: &Path) -> Self {
    Self {
      source,
      cache: ManifestCache::new(cache_dir),
    }
  }

  pub async fn resolve(&self, spec: &ToolchainSpec, system: &SystemId) -> Result<ToolchainBundle, ToolchainError> {
    let host = system.rust_triple();
    match &spec.strategy {
      ToolchainStrategy::Pinned { channel, sha256 } => self.resolve_pinned(spec, channel, sha256, &host).await,
      ToolchainStrategy::Floating { channel, lookback_days } => {
        self.resolve_floating(spec, channel, *lookback_days, &host).await
      }
    }
  }

  /// Select `spec` out of the exact manifest `base` was resolved from.
  ///
  /// Never walks back: a component missing from that manifest is an
  /// error, and `base` stays valid either way.
  pub async fn extend(&self, base: &ToolchainBundle, spec: &ToolchainSpec) -> Result<ToolchainBundle, ToolchainError> {
    let bytes = match self.cache.get(&base.channel, &base.manifest_sha256).await {
      Some(bytes) => bytes,
      None => {
        let date = parse_date(&base.date)?;
        let rel = manifest_path(&spec.strategy.channel().name, Some(date));
        self.fetch_verified(&rel, &base.channel, &base.manifest_sha256).await?
      }
    };

    let manifest = ChannelManifest::parse(&bytes)?;
    select(&manifest, spec, &base.host, &base.channel, &base.manifest_sha256)
      .map_err(|gap| gap.into_error(&base.channel, &base.host))
  }

  /// Fetch `rel`, require it to hash to `sha256`, and cache it under `label`.
  async fn fetch_verified(&self, rel: &str, label: &str, sha256: &str) -> Result<Vec<u8>, ToolchainError> {
    info!(channel = %label, source = %self.source.describe(), "fetching pinned manifest");
    let bytes = self
      .source
      .fetch_dist(rel)
      .await?
      .ok_or_else(|| ToolchainError::Unavailable {
        query: label.to_string(),
        reason: format!("{} not found at {}", rel, self.source.describe()),
      })?;

    let actual = hash_bytes(&bytes);
    if !actual.matches(sha256) {
      return Err(ToolchainError::Integrity {
        what: format!("channel manifest {}", label),
        expected: sha256.to_string(),
        actual: actual.0,
      });
    }
    self.cache.put(label, sha256, &bytes).await?;
    Ok(bytes)
  }

  async fn resolve_pinned(
    &self,
    spec: &ToolchainSpec,
    channel: &Channel,
    sha256: &str,
    host: &str,
  ) -> Result<ToolchainBundle, ToolchainError> {
    let label = channel.to_string();
    let bytes = match self.cache.get(&label, sha256).await {
      Some(bytes) => {
        debug!(channel = %channel, "using cached manifest");
        bytes
      }
      None => self.fetch_verified(&channel.manifest_path(), &label, sha256).await?,
    };

    let manifest = ChannelManifest::parse(&bytes)?;
    select(&manifest, spec, host, &label, sha256).map_err(|gap| gap.into_error(&label, host))
  }

  /// Remember a floating selection so later extensions find its manifest.
  async fn keep(&self, bundle: ToolchainBundle, bytes: &[u8]) -> Result<ToolchainBundle, ToolchainError> {
    self.cache.put(&bundle.channel, &bundle.manifest_sha256, bytes).await?;
    Ok(bundle)
  }

  async fn resolve_floating(
    &self,
    spec: &ToolchainSpec,
    channel: &Channel,
    lookback_days: u32,
    host: &str,
  ) -> Result<ToolchainBundle, ToolchainError> {
    let query = format!("latest {} offering {}", channel, spec.requested_components().join(", "));
    let rel = channel.manifest_path();
    info!(channel = %channel, source = %self.source.describe(), "fetching latest manifest");

    let bytes = self
      .source
      .fetch_dist(&rel)
      .await?
      .ok_or_else(|| ToolchainError::Unavailable {
        query: query.clone(),
        reason: format!("{} not found at {}", rel, self.source.describe()),
      })?;
    let manifest = ChannelManifest::parse(&bytes)?;

    let mut last_gap = match try_select(&manifest, &bytes, spec, channel, host) {
      Ok(bundle) => return self.keep(bundle, &bytes).await,
      Err(gap) if gap.is_permanent() => return Err(gap.into_error(&channel.to_string(), host)),
      Err(gap) => gap,
    };

    let mut date = parse_date(&manifest.date)?;

    for _ in 0..lookback_days {
      date = match date.pred_opt() {
        Some(d) => d,
        None => break,
      };
      let rel = manifest_path(&channel.name, Some(date));
      let Some(bytes) = self.source.fetch_dist(&rel).await? else {
        debug!(date = %date, "no manifest published");
        continue;
      };
      let manifest = ChannelManifest::parse(&bytes)?;
      match try_select(&manifest, &bytes, spec, channel, host) {
        Ok(bundle) => {
          info!(date = %date, "selected older manifest");
          return self.keep(bundle, &bytes).await;
        }
        Err(gap) => {
          debug!(date = %date, gap = ?gap, "manifest lacks requested pieces");
          last_gap = gap;
        }
      }
    }

    let missing = match last_gap {
      Gap::UnknownComponent(name) | Gap::ComponentUnavailable(name) => format!("component {}", name),
      Gap::UnknownTarget(name) | Gap::TargetUnavailable(name) => format!("target {}", name),
    };
    Err(ToolchainError::Unavailable {
      query,
      reason: format!("no manifest in the last {} days provides {}", lookback_days, missing),
    })
  }
}

fn parse_date(date: &str) -> Result<NaiveDate, ToolchainError> {
  NaiveDate::parse_from_str(date, "%Y-%m-%d")
    .map_err(|e| ToolchainError::Manifest(format!("bad manifest date {}: {}", date, e)))
}

fn try_select(
  manifest: &ChannelManifest,
  bytes: &[u8],
  spec: &ToolchainSpec,
  channel: &Channel,
  host: &str,
) -> Result<ToolchainBundle, Gap> {
  let label = format!("{}-{}", channel.name, manifest.date);
  select(manifest, spec, host, &label, &hash_bytes(bytes).0)
}

/// Pick the artifacts for `spec` out of one manifest.
fn select(
  manifest: &ChannelManifest,
  spec: &ToolchainSpec,
  host: &str,
  label: &str,
  manifest_sha256: &str,
) -> Result<ToolchainBundle, Gap> {
  let components = spec.requested_components();
  let mut artifacts = Vec::new();

  for component in &components {
    match manifest.lookup(component, host) {
      Lookup::UnknownComponent => return Err(Gap::UnknownComponent(component.clone())),
      Lookup::UnknownTarget | Lookup::Unavailable => return Err(Gap::ComponentUnavailable(component.clone())),
      Lookup::Available { target, package } => artifacts.push(Artifact {
        component: component.clone(),
        target: target.to_string(),
        url: package.url.clone().unwrap_or_default(),
        sha256: package.hash.clone().unwrap_or_default(),
      }),
    }
  }

  let published = manifest.published_targets();
  let mut targets: Vec<String> = Vec::new();
  for target in &spec.targets {
    if targets.contains(target) {
      continue;
    }
    if !published.contains(&target.as_str()) {
      return Err(Gap::UnknownTarget(target.clone()));
    }
    targets.push(target.clone());
    if target == host {
      continue;
    }
    match manifest.lookup("rust-std", target) {
      Lookup::Available { package, .. } => artifacts.push(Artifact {
        component: "rust-std".to_string(),
        target: target.clone(),
        url: package.url.clone().unwrap_or_default(),
        sha256: package.hash.clone().unwrap_or_default(),
      }),
      _ => return Err(Gap::TargetUnavailable(target.clone())),
    }
  }

  Ok(ToolchainBundle {
    channel: label.to_string(),
    date: manifest.date.clone(),
    rustc_version: manifest.rustc_version().to_string(),
    manifest_sha256: manifest_sha256.to_ascii_lowercase(),
    host: host.to_string(),
    components,
    targets,
    artifacts,
  })
}
