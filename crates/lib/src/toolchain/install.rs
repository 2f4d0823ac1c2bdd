//! Toolchain installation into the store.
//!
//! Each artifact of a [`ToolchainBundle`] is a rustup-style `.tar.gz`:
//!
//! ```text
//! rustc-nightly-x86_64-unknown-linux-gnu/
//! ├── components          # one component directory name per line
//! └── rustc/
//!     ├── manifest.in
//!     ├── bin/rustc
//!     └── lib/...
//! ```
//!
//! Every listed component directory is merged into
//! `<store>/toolchain/<bundle-hash>/`. The prefix is staged next to its final
//! location and renamed into place once complete, so a prefix carrying the
//! completion marker is always whole. Archive extraction runs on the blocking
//! pool; everything else goes through `tokio::fs`.

use std::fs;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::consts::COMPLETE_MARKER;
use crate::toolchain::source::ManifestSource;
use crate::toolchain::types::{Artifact, ToolchainBundle, ToolchainError};
use crate::util::hash::{Hashable, hash_bytes};

/// Files inside a component directory that are installer bookkeeping.
const SKIPPED_FILES: &[&str] = &["manifest.in"];

/// Store path of an installed bundle.
pub fn toolchain_dir(store_dir: &Path, bundle: &ToolchainBundle) -> Result<PathBuf, ToolchainError> {
  let hash = bundle.compute_hash()?;
  Ok(store_dir.join("toolchain").join(hash.0))
}

pub struct Installer<'a, S: ManifestSource> {
  source: &'a S,
  store_dir: PathBuf,
  cache_dir: PathBuf,
}

impl<'a, S: ManifestSource> Installer<'a, S> {
  pub fn new(source: &'a S, store_dir: &Path, cache_dir: &Path) -> Self {
    Self {
      source,
      store_dir: store_dir.to_path_buf(),
      cache_dir: cache_dir.to_path_buf(),
    }
  }

  /// Install `bundle` and return its prefix. Already complete installs are
  /// returned as-is without touching the network.
  pub async fn install(&self, bundle: &ToolchainBundle) -> Result<PathBuf, ToolchainError> {
    let prefix = toolchain_dir(&self.store_dir, bundle)?;
    if tokio::fs::try_exists(prefix.join(COMPLETE_MARKER)).await? {
      debug!(prefix = %prefix.display(), "toolchain already installed");
      return Ok(prefix);
    }

    info!(channel = %bundle.channel, artifacts = bundle.artifacts.len(), "installing toolchain");

    let file_name = prefix.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let staging = prefix.with_file_name(format!(".{}.tmp", file_name));
    if tokio::fs::try_exists(&staging).await? {
      tokio::fs::remove_dir_all(&staging).await?;
    }
    let staged_prefix = staging.join("prefix");
    tokio::fs::create_dir_all(&staged_prefix).await?;

    for (index, artifact) in bundle.artifacts.iter().enumerate() {
      let bytes = self.download(artifact).await?;
      let unpack_dir = staging.join(format!("unpack-{}", index));
      let target = staged_prefix.clone();
      let url = artifact.url.clone();
      tokio::task::spawn_blocking(move || unpack_component(&bytes, &unpack_dir, &target, &url))
        .await
        .map_err(|e| ToolchainError::Archive {
          url: artifact.url.clone(),
          message: e.to_string(),
        })??;
      debug!(component = %artifact.component, target = %artifact.target, "component installed");
    }

    tokio::fs::write(staged_prefix.join(COMPLETE_MARKER), &bundle.manifest_sha256).await?;
    if tokio::fs::try_exists(&prefix).await? {
      tokio::fs::remove_dir_all(&prefix).await?;
    }
    tokio::fs::rename(&staged_prefix, &prefix).await?;
    tokio::fs::remove_dir_all(&staging).await?;

    info!(prefix = %prefix.display(), "toolchain installed");
    Ok(prefix)
  }

  /// Fetch an artifact, reusing `<cache>/downloads/<sha256>` when it verifies.
  async fn download(&self, artifact: &Artifact) -> Result<Vec<u8>, ToolchainError> {
    let downloads = self.cache_dir.join("downloads");
    let cached = downloads.join(artifact.sha256.to_ascii_lowercase());

    match tokio::fs::read(&cached).await {
      Ok(bytes) => {
        let actual = hash_bytes(&bytes);
        if actual.matches(&artifact.sha256) {
          debug!(url = %artifact.url, "using cached download");
          return Ok(bytes);
        }
        debug!(expected = %artifact.sha256, actual = %actual, "cached download hash mismatch, re-downloading");
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => debug!(error = %e, "cached download unreadable, re-downloading"),
    }

    info!(url = %artifact.url, "fetching artifact");
    let bytes = self.source.fetch_artifact(&artifact.url).await?;

    // Verify hash before writing
    let actual = hash_bytes(&bytes);
    if !actual.matches(&artifact.sha256) {
      return Err(ToolchainError::Integrity {
        what: artifact.url.clone(),
        expected: artifact.sha256.clone(),
        actual: actual.0,
      });
    }

    tokio::fs::create_dir_all(&downloads).await?;
    tokio::fs::write(&cached, &bytes).await?;
    Ok(bytes)
  }
}

/// Unpack one archive and merge its component directories into `prefix`.
fn unpack_component(bytes: &[u8], unpack_dir: &Path, prefix: &Path, url: &str) -> Result<(), ToolchainError> {
  let archive_err = |message: String| ToolchainError::Archive {
    url: url.to_string(),
    message,
  };

  fs::create_dir_all(unpack_dir)?;
  tar::Archive::new(GzDecoder::new(bytes))
    .unpack(unpack_dir)
    .map_err(|e| archive_err(e.to_string()))?;

  let mut roots = fs::read_dir(unpack_dir)?
    .filter_map(Result::ok)
    .filter(|e| e.path().is_dir())
    .map(|e| e.path());
  let root = match (roots.next(), roots.next()) {
    (Some(root), None) => root,
    _ => return Err(archive_err("expected exactly one top-level directory".to_string())),
  };

  let components_file = root.join("components");
  if components_file.exists() {
    let listing = fs::read_to_string(&components_file)?;
    for component in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
      let dir = root.join(component);
      if !dir.is_dir() {
        return Err(archive_err(format!("listed component '{}' is missing", component)));
      }
      merge_tree(&dir, prefix)?;
    }
  } else {
    merge_tree(&root, prefix)?;
  }

  Ok(())
}

/// Copy every file under `from` into `to`, keeping relative paths.
fn merge_tree(from: &Path, to: &Path) -> Result<(), ToolchainError> {
  for entry in WalkDir::new(from).min_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
    let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
    if entry.depth() == 1 && SKIPPED_FILES.iter().any(|s| rel == Path::new(s)) {
      continue;
    }

    let dest = to.join(rel);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&dest)?;
    } else {
      if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
      }
      // fs::copy keeps permission bits, so executables stay executable.
      fs::copy(entry.path(), &dest)?;
    }
  }
  Ok(())
}
