use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compose::{ComposeOptions, Dependency, DependencyDecls};
use crate::config::FileReadError;
use crate::execute::ExecuteError;
use crate::flake::EvalError;
use crate::platform::SystemId;
use crate::toolchain::{ToolchainError, ToolchainSpec};
use crate::util::hash::HashError;

use super::package::PackageSpec;
use super::shell::ShellSpec;

/// Cargo's name for a crate's own default feature set.
pub const DEFAULT_FEATURES: &[&str] = &["default"];

/// Where the value of a build environment variable comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSource {
  Literal(String),
  /// Contents of a text file, read at evaluation time.
  File(PathBuf),
}

/// How to build the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
  pub name: String,
  pub src: PathBuf,
  pub features: Vec<String>,
  /// Replaces the crate's default features. `None` leaves cargo's defaults on.
  pub default_features: Option<Vec<String>>,
  pub cargo_flags: Vec<String>,
  pub bins: Vec<String>,
  pub env: BTreeMap<String, EnvSource>,
}

impl BuildOptions {
  pub fn new(name: impl Into<String>, src: impl Into<PathBuf>) -> Self {
    let name = name.into();
    Self {
      bins: vec![name.clone()],
      name,
      src: src.into(),
      features: Vec::new(),
      default_features: None,
      cargo_flags: Vec::new(),
      env: BTreeMap::new(),
    }
  }

  /// Default features followed by requested ones, without duplicates.
  /// Cargo's implicit defaults appear as `default`.
  pub fn effective_features(&self) -> Vec<String> {
    let implicit: Vec<String> = DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect();
    let defaults = self.default_features.as_ref().unwrap_or(&implicit);
    union(defaults, &self.features)
  }

  /// True when cargo's own default features stay enabled.
  pub fn keeps_crate_defaults(&self) -> bool {
    self.default_features.is_none()
  }

  /// Names to pass to `--features`. Only names the flake gave are listed;
  /// `default` is left to cargo while the crate defaults are kept.
  pub fn cargo_features(&self) -> Vec<String> {
    match &self.default_features {
      Some(defaults) => union(defaults, &self.features),
      None => union(&[], &self.features)
        .into_iter()
        .filter(|f| !DEFAULT_FEATURES.contains(&f.as_str()))
        .collect(),
    }
  }
}

fn union(first: &[String], second: &[String]) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for feature in first.iter().chain(second.iter()) {
    if !out.contains(feature) {
      out.push(feature.clone());
    }
  }
  out
}

/// Extras only the development shell gets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOptions {
  /// Toolchain components on top of the package's (e.g. `language-server`).
  pub components: Vec<String>,
  pub tools: Vec<Dependency>,
  pub hook: Option<String>,
}

/// Everything one system's outputs are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeriveRequest {
  pub toolchain: ToolchainSpec,
  pub deps: DependencyDecls,
  pub compose: ComposeOptions,
  pub build: BuildOptions,
  pub shell: ShellOptions,
}

/// The two outputs of one system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
  pub system: SystemId,
  pub package: PackageSpec,
  pub shell: ShellSpec,
}

#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
  #[error(transparent)]
  Eval(#[from] EvalError),

  #[error(transparent)]
  FileRead(#[from] FileReadError),

  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error("build failed: {0}")]
  Build(#[from] ExecuteError),

  #[error("binary '{name}' was not produced by the build (looked in {path})")]
  MissingBinary { name: String, path: PathBuf },

  #[error("failed to hash output: {0}")]
  Hash(#[from] HashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
