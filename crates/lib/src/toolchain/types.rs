use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_LOOKBACK_DAYS;
use crate::toolchain::source::SourceError;
use crate::util::hash::{HashError, Hashable};

/// Components every bundle carries regardless of the request.
pub const BASE_COMPONENTS: &[&str] = &["rustc", "cargo", "rust-std"];

/// Errors raised while resolving or installing a toolchain.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
  /// A fetched artifact did not match its expected SHA-256.
  #[error("integrity check failed for {what}: expected {expected}, got {actual}")]
  Integrity {
    what: String,
    expected: String,
    actual: String,
  },

  /// Nothing upstream satisfies the query.
  #[error("no toolchain available for {query}: {reason}")]
  Unavailable { query: String, reason: String },

  #[error("component '{component}' is not offered by toolchain {channel} for {target}")]
  UnsupportedComponent {
    component: String,
    channel: String,
    target: String,
  },

  #[error("target '{target}' is not published for toolchain {channel}")]
  UnsupportedTarget { target: String, channel: String },

  #[error("invalid channel name: {0}")]
  InvalidChannel(String),

  #[error("malformed channel manifest: {0}")]
  Manifest(String),

  #[error("failed to unpack {url}: {message}")]
  Archive { url: String, message: String },

  #[error(transparent)]
  Source(#[from] SourceError),

  #[error("failed to hash toolchain bundle: {0}")]
  Hash(#[from] HashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// A release channel, optionally pinned to a date (e.g. `nightly-2023-05-20`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
  pub name: String,
  pub date: Option<NaiveDate>,
}

impl Channel {
  /// Location of this channel's manifest relative to the distribution root.
  pub fn manifest_path(&self) -> String {
    manifest_path(&self.name, self.date)
  }
}

/// `dist/[<date>/]channel-rust-<name>.toml`
pub fn manifest_path(name: &str, date: Option<NaiveDate>) -> String {
  match date {
    Some(date) => format!("dist/{}/channel-rust-{}.toml", date.format("%Y-%m-%d"), name),
    None => format!("dist/channel-rust-{}.toml", name),
  }
}

fn is_release_name(name: &str) -> bool {
  matches!(name, "stable" | "beta" | "nightly")
    || (!name.is_empty()
      && name.split('.').count() >= 2
      && name.split('.').all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())))
}

impl FromStr for Channel {
  type Err = ToolchainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if !s.is_ascii() {
      return Err(ToolchainError::InvalidChannel(s.to_string()));
    }

    // "<name>-YYYY-MM-DD"
    if s.len() > 11 {
      let (head, tail) = s.split_at(s.len() - 10);
      if let (Some(name), Ok(date)) = (head.strip_suffix('-'), NaiveDate::parse_from_str(tail, "%Y-%m-%d")) {
        if is_release_name(name) {
          return Ok(Self {
            name: name.to_string(),
            date: Some(date),
          });
        }
      }
    }

    if is_release_name(s) {
      Ok(Self {
        name: s.to_string(),
        date: None,
      })
    } else {
      Err(ToolchainError::InvalidChannel(s.to_string()))
    }
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.date {
      Some(date) => write!(f, "{}-{}", self.name, date.format("%Y-%m-%d")),
      None => write!(f, "{}", self.name),
    }
  }
}

/// How a toolchain is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainStrategy {
  /// Fixed channel whose manifest must hash to `sha256`.
  Pinned { channel: Channel, sha256: String },
  /// Newest manifest of `channel` that offers every requested component,
  /// searching at most `lookback_days` back.
  Floating { channel: Channel, lookback_days: u32 },
}

impl ToolchainStrategy {
  pub fn channel(&self) -> &Channel {
    match self {
      Self::Pinned { channel, .. } | Self::Floating { channel, .. } => channel,
    }
  }
}

/// A toolchain request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSpec {
  pub strategy: ToolchainStrategy,
  pub components: Vec<String>,
  pub targets: Vec<String>,
}

impl ToolchainSpec {
  pub fn pinned(channel: &str, sha256: &str) -> Result<Self, ToolchainError> {
    Ok(Self {
      strategy: ToolchainStrategy::Pinned {
        channel: channel.parse()?,
        sha256: sha256.to_string(),
      },
      components: Vec::new(),
      targets: Vec::new(),
    })
  }

  pub fn floating(channel: &str) -> Result<Self, ToolchainError> {
    Ok(Self {
      strategy: ToolchainStrategy::Floating {
        channel: channel.parse()?,
        lookback_days: DEFAULT_LOOKBACK_DAYS,
      },
      components: Vec::new(),
      targets: Vec::new(),
    })
  }

  pub fn with_components<I, S>(mut self, components: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.components = components.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_targets<I, S>(mut self, targets: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.targets = targets.into_iter().map(Into::into).collect();
    self
  }

  /// Base components followed by the requested ones, aliases expanded,
  /// duplicates dropped, request order kept.
  pub fn requested_components(&self) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let requested = self.components.iter().map(|c| canonical_component(c));
    for name in BASE_COMPONENTS.iter().copied().chain(requested) {
      if !out.iter().any(|c| c == name) {
        out.push(name.to_string());
      }
    }
    out
  }
}

/// Expand a role alias (`compiler`, `formatter`, ...) into the upstream
/// component name. Unknown names pass through untouched.
pub fn canonical_component(name: &str) -> &str {
  match name {
    "compiler" => "rustc",
    "build-tool" => "cargo",
    "formatter" => "rustfmt",
    "linter" => "clippy",
    "source-bundle" => "rust-src",
    "language-server" => "rust-analyzer",
    "std" => "rust-std",
    other => other,
  }
}

/// One downloadable piece of a toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  pub component: String,
  pub target: String,
  pub url: String,
  pub sha256: String,
}

/// A fully resolved toolchain: exactly the artifacts to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainBundle {
  /// The channel that was resolved, dated when the manifest carried a date.
  pub channel: String,
  pub date: String,
  pub rustc_version: String,
  pub manifest_sha256: String,
  pub host: String,
  pub components: Vec<String>,
  pub targets: Vec<String>,
  pub artifacts: Vec<Artifact>,
}

impl Hashable for ToolchainBundle {}

impl ToolchainBundle {
  /// Name used when the bundle appears as a dependency.
  pub fn dependency_name(&self) -> String {
    format!("rust-{}", self.channel)
  }
}
