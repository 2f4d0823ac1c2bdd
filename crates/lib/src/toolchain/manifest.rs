//! Rust distribution channel manifests (`channel-rust-*.toml`, version 2).
//!
//! ```toml
//! manifest-version = "2"
//! date = "2023-05-20"
//!
//! [pkg.rustc]
//! version = "1.71.0-nightly (8b4b20836 2023-05-19)"
//!
//! [pkg.rustc.target.x86_64-unknown-linux-gnu]
//! available = true
//! url = "https://static.rust-lang.org/dist/2023-05-20/rustc-nightly-x86_64-unknown-linux-gnu.tar.gz"
//! hash = "…"
//!
//! [renames.clippy-preview]
//! to = "clippy"
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::toolchain::types::ToolchainError;

/// Target key used by components that are the same on every platform.
pub const ANY_TARGET: &str = "*";

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelManifest {
  #[serde(rename = "manifest-version")]
  pub manifest_version: String,
  pub date: String,
  #[serde(default)]
  pub pkg: BTreeMap<String, PackageInfo>,
  #[serde(default)]
  pub renames: BTreeMap<String, Rename>,
  #[serde(default)]
  pub profiles: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageInfo {
  #[serde(default)]
  pub version: String,
  #[serde(default)]
  pub target: BTreeMap<String, TargetedPackage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetedPackage {
  #[serde(default)]
  pub available: bool,
  pub url: Option<String>,
  pub hash: Option<String>,
  pub xz_url: Option<String>,
  pub xz_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rename {
  pub to: String,
}

/// Outcome of looking a component up for a target.
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
  /// The manifest has no such component at all.
  UnknownComponent,
  /// The component exists but has no entry for the target.
  UnknownTarget,
  /// Listed, but not built for this date.
  Unavailable,
  /// Downloadable; carries the target key that matched (`*` or the triple).
  Available { target: &'a str, package: &'a TargetedPackage },
}

impl ChannelManifest {
  pub fn parse(bytes: &[u8]) -> Result<Self, ToolchainError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ToolchainError::Manifest(e.to_string()))?;
    let manifest: ChannelManifest = toml::from_str(text).map_err(|e| ToolchainError::Manifest(e.to_string()))?;
    if manifest.manifest_version != "2" {
      return Err(ToolchainError::Manifest(format!(
        "unsupported manifest-version {}",
        manifest.manifest_version
      )));
    }
    Ok(manifest)
  }

  /// Follow `[renames]` so `clippy-preview` finds `clippy`.
  pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
    self.renames.get(name).map(|r| r.to.as_str()).unwrap_or(name)
  }

  pub fn lookup<'a>(&'a self, component: &str, target: &'a str) -> Lookup<'a> {
    let name = self.canonical_name(component);
    let Some(info) = self.pkg.get(name) else {
      return Lookup::UnknownComponent;
    };

    let entry = info
      .target
      .get_key_value(target)
      .or_else(|| info.target.get_key_value(ANY_TARGET));

    match entry {
      None => Lookup::UnknownTarget,
      Some((_, package)) if !package.available || package.url.is_none() || package.hash.is_none() => {
        Lookup::Unavailable
      }
      Some((key, package)) => Lookup::Available {
        target: key.as_str(),
        package,
      },
    }
  }

  /// Targets the standard library is published for.
  pub fn published_targets(&self) -> Vec<&str> {
    self
      .pkg
      .get("rust-std")
      .map(|info| info.target.keys().map(String::as_str).collect())
      .unwrap_or_default()
  }

  /// The rustc version string, or the manifest date when rustc is absent.
  pub fn rustc_version(&self) -> &str {
    self
      .pkg
      .get("rustc")
      .map(|info| info.version.as_str())
      .filter(|v| !v.is_empty())
      .unwrap_or(&self.date)
  }
}
