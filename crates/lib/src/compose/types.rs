use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A build tool or native library, identified by name.
///
/// `prefix` is the install root the dependency lives under. A dependency
/// without a prefix is provided by the host and contributes no search paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prefix: Option<PathBuf>,
}

impl Dependency {
  /// A dependency supplied by the host system.
  pub fn host(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      prefix: None,
    }
  }

  /// A dependency installed under `prefix`.
  pub fn at(name: impl Into<String>, prefix: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      prefix: Some(prefix.into()),
    }
  }

  pub fn bin_dir(&self) -> Option<PathBuf> {
    self.subdir("bin")
  }

  pub fn lib_dir(&self) -> Option<PathBuf> {
    self.subdir("lib")
  }

  fn subdir(&self, rel: impl AsRef<Path>) -> Option<PathBuf> {
    self.prefix.as_ref().map(|p| p.join(rel))
  }
}

/// A post-processing step run on the built package, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildHook {
  /// Wrap `bin/<program>` so it finds the runtime libraries at launch.
  WrapProgram { program: String },
  /// Run a shell command with `out` set to the package directory.
  Cmd { cmd: String },
}

/// The build tools, runtime libraries and packaging hooks of one system.
///
/// Both lists keep insertion order and never share a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
  pub build_tools: Vec<Dependency>,
  pub runtime_libs: Vec<Dependency>,
  pub hooks: Vec<BuildHook>,
}

impl DependencySet {
  pub fn contains(&self, name: &str) -> bool {
    self.iter().any(|d| d.name == name)
  }

  /// Append a build tool unless the name is already present. Returns whether
  /// it was added.
  pub fn push_build_tool(&mut self, dep: Dependency) -> bool {
    if self.contains(&dep.name) {
      return false;
    }
    self.build_tools.push(dep);
    true
  }

  /// Append a runtime library unless the name is already present.
  pub fn push_runtime_lib(&mut self, dep: Dependency) -> bool {
    if self.contains(&dep.name) {
      return false;
    }
    self.runtime_libs.push(dep);
    true
  }

  /// Append a hook unless an identical one is already present.
  pub fn push_hook(&mut self, hook: BuildHook) -> bool {
    if self.hooks.contains(&hook) {
      return false;
    }
    self.hooks.push(hook);
    true
  }

  /// Build tools followed by runtime libraries.
  pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
    self.build_tools.iter().chain(self.runtime_libs.iter())
  }

  pub fn len(&self) -> usize {
    self.build_tools.len() + self.runtime_libs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
