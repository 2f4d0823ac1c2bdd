//! Store and cache directory layout.
//!
//! ```text
//! <store>/
//! ├── toolchain/<hash>/     # installed toolchain bundles
//! └── pkg/<name>-<hash>/    # built packages
//! <cache>/
//! ├── manifests/<sha256>.toml
//! ├── downloads/<sha256>
//! └── cargo/                # CARGO_HOME for package builds
//! ```

use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application
///
/// `ENVFLAKE_CACHE` overrides the platform default.
pub fn cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var("ENVFLAKE_CACHE") {
    return PathBuf::from(path);
  }
  default_cache_dir()
}

#[cfg(windows)]
fn default_cache_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
    .join("Cache")
}

#[cfg(not(windows))]
fn default_cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the store holding installed toolchains and built packages.
///
/// `ENVFLAKE_STORE` overrides the default of `<data>/store`.
pub fn store_dir() -> PathBuf {
  if let Ok(path) = std::env::var("ENVFLAKE_STORE") {
    return PathBuf::from(path);
  }
  data_dir().join("store")
}
