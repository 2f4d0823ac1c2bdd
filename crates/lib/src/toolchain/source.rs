//! Where channel manifests and toolchain archives come from.
//!
//! The upstream distribution server is treated as an opaque collaborator:
//! a [`ManifestSource`] only knows how to hand back bytes. Verification and
//! caching happen in the resolver and installer.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::DEFAULT_DIST_SERVER;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
  #[error("fetch failed for {location}: {message}")]
  FetchFailed { location: String, message: String },

  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// A distribution root serving `dist/...` manifests and component archives.
#[allow(async_fn_in_trait)]
pub trait ManifestSource {
  /// Fetch a file relative to the distribution root.
  ///
  /// Returns `Ok(None)` when the file does not exist upstream.
  async fn fetch_dist(&self, rel_path: &str) -> Result<Option<Vec<u8>>, SourceError>;

  /// Fetch an archive referenced by a manifest.
  async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, SourceError>;

  /// Human-readable location for logs and errors.
  fn describe(&self) -> String;
}

/// Distribution server reached over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
  base_url: String,
  client: reqwest::Client,
}

impl HttpSource {
  pub fn new(base_url: &str) -> Self {
    Self {
      base_url: base_url.trim_end_matches('/').to_string(),
      client: reqwest::Client::new(),
    }
  }

  fn absolute(&self, url: &str) -> String {
    if is_remote(url) {
      url.to_string()
    } else {
      format!("{}/{}", self.base_url, url.trim_start_matches('/'))
    }
  }

  async fn get(&self, url: &str) -> Result<Option<Vec<u8>>, SourceError> {
    let fetch_failed = |message: String| SourceError::FetchFailed {
      location: url.to_string(),
      message,
    };

    let response = self.client.get(url).send().await.map_err(|e| fetch_failed(e.to_string()))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !response.status().is_success() {
      return Err(fetch_failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| fetch_failed(e.to_string()))?;
    Ok(Some(bytes.to_vec()))
  }
}

impl Default for HttpSource {
  fn default() -> Self {
    Self::new(DEFAULT_DIST_SERVER)
  }
}

impl ManifestSource for HttpSource {
  async fn fetch_dist(&self, rel_path: &str) -> Result<Option<Vec<u8>>, SourceError> {
    let url = self.absolute(rel_path);
    debug!(url = %url, "fetching from distribution server");
    self.get(&url).await
  }

  async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, SourceError> {
    let url = self.absolute(url);
    debug!(url = %url, "fetching artifact");
    self.get(&url).await?.ok_or_else(|| SourceError::FetchFailed {
      location: url.clone(),
      message: "HTTP 404 Not Found".to_string(),
    })
  }

  fn describe(&self) -> String {
    self.base_url.clone()
  }
}

/// A local mirror laid out like the distribution server.
///
/// Artifact URLs may be `file://` URLs, paths relative to the mirror root,
/// or upstream `https://` URLs whose path is looked up under the root.
#[derive(Debug, Clone)]
pub struct DirSource {
  root: PathBuf,
}

impl DirSource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn local_path(&self, url: &str) -> PathBuf {
    if let Some(path) = url.strip_prefix("file://") {
      return PathBuf::from(path);
    }
    if is_remote(url) {
      // Drop scheme and host: "https://host/dist/x.tar.gz" -> "dist/x.tar.gz"
      let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
      let path = without_scheme.split_once('/').map(|(_, path)| path).unwrap_or("");
      return self.root.join(path);
    }
    self.root.join(url.trim_start_matches('/'))
  }

  async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, SourceError> {
    match tokio::fs::read(path).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(SourceError::Io {
        path: path.to_path_buf(),
        source,
      }),
    }
  }
}

impl ManifestSource for DirSource {
  async fn fetch_dist(&self, rel_path: &str) -> Result<Option<Vec<u8>>, SourceError> {
    let path = self.local_path(rel_path);
    debug!(path = %path.display(), "reading from local mirror");
    self.read(&path).await
  }

  async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, SourceError> {
    let path = self.local_path(url);
    self.read(&path).await?.ok_or_else(|| SourceError::Io {
      path: path.clone(),
      source: std::io::Error::new(std::io::ErrorKind::NotFound, "artifact missing from mirror"),
    })
  }

  fn describe(&self) -> String {
    self.root.display().to_string()
  }
}

/// The source selected by configuration.
#[derive(Debug, Clone)]
pub enum DistSource {
  Http(HttpSource),
  Dir(DirSource),
}

impl DistSource {
  /// Interpret a server setting: `http(s)://` URLs are fetched over the
  /// network, anything else (including `file://`) is a local mirror.
  pub fn from_location(location: &str) -> Self {
    if is_remote(location) {
      Self::Http(HttpSource::new(location))
    } else {
      let path = location.strip_prefix("file://").unwrap_or(location);
      Self::Dir(DirSource::new(path))
    }
  }

  /// `ENVFLAKE_DIST_SERVER`, falling back to the official server.
  pub fn from_env() -> Self {
    match std::env::var("ENVFLAKE_DIST_SERVER") {
      Ok(location) if !location.is_empty() => Self::from_location(&location),
      _ => Self::Http(HttpSource::default()),
    }
  }
}

impl ManifestSource for DistSource {
  async fn fetch_dist(&self, rel_path: &str) -> Result<Option<Vec<u8>>, SourceError> {
    match self {
      Self::Http(source) => source.fetch_dist(rel_path).await,
      Self::Dir(source) => source.fetch_dist(rel_path).await,
    }
  }

  async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, SourceError> {
    match self {
      Self::Http(source) => source.fetch_artifact(url).await,
      Self::Dir(source) => source.fetch_artifact(url).await,
    }
  }

  fn describe(&self) -> String {
    match self {
      Self::Http(source) => source.describe(),
      Self::Dir(source) => source.describe(),
    }
  }
}

fn is_remote(url: &str) -> bool {
  url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  #[tokio::test]
  async fn dir_source_reports_missing_manifest_as_none() {
    let temp = TempDir::new().unwrap();
    let source = DirSource::new(temp.path());
    let result = source.fetch_dist("dist/channel-rust-nightly.toml").await.unwrap();
    assert!(result.is_none());
  }

  #[tokio::test]
  async fn dir_source_maps_upstream_urls_into_mirror() {
    let temp = TempDir::new().unwrap();
    let dist = temp.path().join("dist").join("2023-05-20");
    std::fs::create_dir_all(&dist).unwrap();
    std::fs::write(dist.join("rustc.tar.gz"), b"archive").unwrap();

    let source = DirSource::new(temp.path());
    let bytes = source
      .fetch_artifact("https://static.rust-lang.org/dist/2023-05-20/rustc.tar.gz")
      .await
      .unwrap();
    assert_eq!(bytes, b"archive");

    let relative = source.fetch_artifact("dist/2023-05-20/rustc.tar.gz").await.unwrap();
    assert_eq!(relative, b"archive");
  }

  #[tokio::test]
  async fn http_source_fetches_and_maps_404() {
    let mut server = mockito::Server::new_async().await;
    let manifest = server
      .mock("GET", "/dist/channel-rust-nightly.toml")
      .with_status(200)
      .with_body("manifest-version = \"2\"")
      .create_async()
      .await;
    let missing = server
      .mock("GET", "/dist/channel-rust-beta.toml")
      .with_status(404)
      .create_async()
      .await;

    let source = HttpSource::new(&server.url());
    let body = source.fetch_dist("dist/channel-rust-nightly.toml").await.unwrap();
    assert_eq!(body.as_deref(), Some(&b"manifest-version = \"2\""[..]));
    assert!(source.fetch_dist("dist/channel-rust-beta.toml").await.unwrap().is_none());

    manifest.assert_async().await;
    missing.assert_async().await;
  }

  #[tokio::test]
  async fn http_source_surfaces_server_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/dist/channel-rust-stable.toml")
      .with_status(500)
      .create_async()
      .await;

    let source = HttpSource::new(&server.url());
    let err = source.fetch_dist("dist/channel-rust-stable.toml").await.unwrap_err();
    assert!(matches!(err, SourceError::FetchFailed { .. }));
  }

  #[test]
  fn location_selects_source_kind() {
    assert!(matches!(
      DistSource::from_location("https://static.rust-lang.org"),
      DistSource::Http(_)
    ));
    match DistSource::from_location("file:///srv/mirror") {
      DistSource::Dir(dir) => assert_eq!(dir.root(), Path::new("/srv/mirror")),
      other => panic!("expected dir source, got {other:?}"),
    }
  }

  #[test]
  #[serial]
  fn env_var_overrides_dist_server() {
    temp_env::with_var("ENVFLAKE_DIST_SERVER", Some("/srv/mirror"), || {
      assert!(matches!(DistSource::from_env(), DistSource::Dir(_)));
    });
    temp_env::with_var("ENVFLAKE_DIST_SERVER", None::<&str>, || {
      assert_eq!(DistSource::from_env().describe(), DEFAULT_DIST_SERVER);
    });
  }
}
