//! Platform identification.
//!
//! A [`SystemId`] (e.g. `x86_64-linux`) scopes every derivation: each system
//! gets its own toolchain resolution, dependency set and outputs.

pub mod arch;
pub mod os;
pub mod paths;

use std::fmt;
use std::str::FromStr;

use arch::Arch;
use os::Os;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
  #[error("unknown architecture: {0}")]
  UnknownArch(String),

  #[error("unknown operating system: {0}")]
  UnknownOs(String),

  #[error("invalid system identifier '{0}', expected <arch>-<os>")]
  Malformed(String),
}

/// System identifier combining architecture and OS (e.g., "aarch64-darwin")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SystemId {
  pub arch: Arch,
  pub os: Os,
}

impl SystemId {
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current system at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// The Rust target triple toolchains for this system are published under.
  pub fn rust_triple(&self) -> String {
    let vendor_os = match self.os {
      Os::Linux => "unknown-linux-gnu",
      Os::MacOs => "apple-darwin",
      Os::Windows => "pc-windows-msvc",
    };
    format!("{}-{}", self.arch, vendor_os)
  }
}

impl fmt::Display for SystemId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.arch, self.os)
  }
}

impl FromStr for SystemId {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    // Arch names contain underscores but never dashes, so split on the first one.
    let (arch, os) = s
      .split_once('-')
      .ok_or_else(|| PlatformError::Malformed(s.to_string()))?;
    Ok(Self {
      arch: arch.parse()?,
      os: os.parse()?,
    })
  }
}

impl TryFrom<String> for SystemId {
  type Error = PlatformError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<SystemId> for String {
  fn from(value: SystemId) -> Self {
    value.to_string()
  }
}

/// Returns the identifier for the current system (e.g., "aarch64-darwin")
///
/// Returns `None` if the current platform is not supported
pub fn current_system() -> Option<String> {
  SystemId::current().map(|s| s.to_string())
}
