use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::compose::{BuildHook, ComposeOptions, Dependency, DependencyDecls};
use crate::outputs::{BuildOptions, DeriveRequest, EnvSource, ShellOptions};
use crate::toolchain::{ToolchainSpec, ToolchainStrategy};

use super::EvalError;

/// The table returned by a flake's `outputs(system)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlakeDef {
  pub toolchain: ToolchainDecl,
  #[serde(default)]
  pub deps: DepsDecl,
  #[serde(default = "default_gui")]
  pub gui: bool,
  pub package: PackageDecl,
  #[serde(default)]
  pub shell: ShellDecl,
}

fn default_gui() -> bool {
  ComposeOptions::default().include_gui_deps
}

/// ```lua
/// toolchain = { channel = "nightly-2023-05-20", sha256 = "…", components = { "formatter" } }
/// toolchain = { channel = "nightly", latest = true }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainDecl {
  pub channel: String,
  pub sha256: Option<String>,
  #[serde(default)]
  pub latest: bool,
  pub lookback_days: Option<u32>,
  #[serde(default)]
  pub components: Vec<String>,
  #[serde(default)]
  pub targets: Vec<String>,
}

impl ToolchainDecl {
  pub fn to_spec(&self) -> Result<ToolchainSpec, EvalError> {
    let spec = match (&self.sha256, self.latest) {
      (Some(sha256), false) => ToolchainSpec::pinned(&self.channel, sha256)?,
      (None, true) => {
        let mut spec = ToolchainSpec::floating(&self.channel)?;
        if let (Some(days), ToolchainStrategy::Floating { lookback_days, .. }) =
          (self.lookback_days, &mut spec.strategy)
        {
          *lookback_days = days;
        }
        spec
      }
      (Some(_), true) => {
        return Err(EvalError::Invalid(format!(
          "toolchain {}: sha256 and latest are mutually exclusive",
          self.channel
        )));
      }
      (None, false) => {
        return Err(EvalError::Invalid(format!(
          "toolchain {}: set either sha256 (pinned) or latest = true (floating)",
          self.channel
        )));
      }
    };
    if self.sha256.is_some() && self.lookback_days.is_some() {
      return Err(EvalError::Invalid("lookback_days only applies to latest = true".to_string()));
    }
    Ok(
      spec
        .with_components(self.components.clone())
        .with_targets(self.targets.clone()),
    )
  }
}

/// A dependency is either a bare name (host provided) or `{ name, prefix }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DependencyDecl {
  Name(String),
  Full { name: String, prefix: Option<PathBuf> },
}

impl DependencyDecl {
  pub fn to_dependency(&self, dir: &Path) -> Dependency {
    match self {
      Self::Name(name) => Dependency::host(name.clone()),
      Self::Full { name, prefix: None } => Dependency::host(name.clone()),
      Self::Full {
        name,
        prefix: Some(prefix),
      } => Dependency::at(name.clone(), dir.join(prefix)),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepsDecl {
  #[serde(default)]
  pub build: Vec<DependencyDecl>,
  #[serde(default)]
  pub runtime: Vec<DependencyDecl>,
  #[serde(default)]
  pub hooks: Vec<BuildHook>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageDecl {
  pub name: String,
  #[serde(default = "default_src")]
  pub src: PathBuf,
  #[serde(default)]
  pub features: Vec<String>,
  pub default_features: Option<Vec<String>>,
  #[serde(default)]
  pub cargo_flags: Vec<String>,
  pub bins: Option<Vec<String>>,
  #[serde(default)]
  pub env: BTreeMap<String, EnvValueDecl>,
}

fn default_src() -> PathBuf {
  PathBuf::from(".")
}

/// `"literal"` or `{ file = "path.txt" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValueDecl {
  Literal(String),
  File { file: PathBuf },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellDecl {
  #[serde(default)]
  pub components: Vec<String>,
  #[serde(default)]
  pub tools: Vec<DependencyDecl>,
  pub hook: Option<String>,
}

impl FlakeDef {
  /// Convert into a derivation request, resolving relative paths against
  /// the flake directory.
  pub fn into_request(self, dir: &Path) -> Result<DeriveRequest, EvalError> {
    let toolchain = self.toolchain.to_spec()?;
    let deps = DependencyDecls {
      build: self.deps.build.iter().map(|d| d.to_dependency(dir)).collect(),
      runtime: self.deps.runtime.iter().map(|d| d.to_dependency(dir)).collect(),
      hooks: self.deps.hooks,
    };

    let package = self.package;
    if package.name.is_empty() {
      return Err(EvalError::Invalid("package.name must not be empty".to_string()));
    }
    let mut build = BuildOptions::new(package.name, dir.join(package.src));
    build.features = package.features;
    build.default_features = package.default_features;
    build.cargo_flags = package.cargo_flags;
    if let Some(bins) = package.bins {
      build.bins = bins;
    }
    build.env = package
      .env
      .into_iter()
      .map(|(key, value)| {
        let source = match value {
          EnvValueDecl::Literal(value) => EnvSource::Literal(value),
          EnvValueDecl::File { file } => EnvSource::File(dir.join(file)),
        };
        (key, source)
      })
      .collect();

    let shell = ShellOptions {
      components: self.shell.components,
      tools: self.shell.tools.iter().map(|d| d.to_dependency(dir)).collect(),
      hook: self.shell.hook,
    };

    Ok(DeriveRequest {
      toolchain,
      deps,
      compose: ComposeOptions {
        include_gui_deps: self.gui,
      },
      build,
      shell,
    })
  }
}
