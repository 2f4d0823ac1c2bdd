//! Search path variables derived from a [`DependencySet`].

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compose::types::{Dependency, DependencySet};

/// Search path variables, each a list of directories in dependency order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPaths {
  #[serde(flatten)]
  vars: BTreeMap<String, Vec<PathBuf>>,
}

impl SearchPaths {
  pub fn from_set(set: &DependencySet) -> Self {
    let mut paths = Self::default();

    for dep in set.iter() {
      paths.add_prefix_dirs(dep);
    }
    // Only runtime libraries are needed by the loader.
    for dep in &set.runtime_libs {
      if let Some(lib) = dep.lib_dir() {
        paths.push("LD_LIBRARY_PATH", lib);
      }
    }

    paths
  }

  fn add_prefix_dirs(&mut self, dep: &Dependency) {
    let (Some(prefix), Some(bin)) = (&dep.prefix, dep.bin_dir()) else {
      return;
    };
    self.push("PATH", bin);
    self.push("PKG_CONFIG_PATH", prefix.join("lib").join("pkgconfig"));
    self.push("PKG_CONFIG_PATH", prefix.join("share").join("pkgconfig"));
    self.push("LIBRARY_PATH", prefix.join("lib"));
    self.push("CPATH", prefix.join("include"));
    self.push("XDG_DATA_DIRS", prefix.join("share"));
  }

  fn push(&mut self, var: &str, dir: PathBuf) {
    let entry = self.vars.entry(var.to_string()).or_default();
    if !entry.contains(&dir) {
      entry.push(dir);
    }
  }

  pub fn get(&self, var: &str) -> &[PathBuf] {
    self.vars.get(var).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn vars(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
    self.vars.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
  }

  /// Join one variable with the platform separator, appending `tail` (an
  /// existing value to extend) when given.
  pub fn joined(&self, var: &str, tail: Option<&OsString>) -> Option<String> {
    let mut dirs: Vec<PathBuf> = self.get(var).to_vec();
    if let Some(tail) = tail {
      dirs.extend(env::split_paths(tail));
    }
    if dirs.is_empty() {
      return None;
    }
    env::join_paths(dirs).ok().map(|joined| joined.to_string_lossy().to_string())
  }

  /// Every variable joined, without any inherited value.
  pub fn to_env(&self) -> BTreeMap<String, String> {
    self
      .vars
      .keys()
      .filter_map(|var| self.joined(var, None).map(|value| (var.clone(), value)))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compose::types::Dependency;

  fn set() -> DependencySet {
    DependencySet {
      build_tools: vec![Dependency::at("rust", "/store/rust"), Dependency::host("pkg-config")],
      runtime_libs: vec![Dependency::at("openssl", "/store/openssl"), Dependency::at("gtk3", "/store/gtk3")],
      hooks: Vec::new(),
    }
  }

  #[test]
  fn paths_follow_dependency_order() {
    let paths = SearchPaths::from_set(&set());
    assert_eq!(
      paths.get("PATH"),
      [
        PathBuf::from("/store/rust/bin"),
        PathBuf::from("/store/openssl/bin"),
        PathBuf::from("/store/gtk3/bin"),
      ]
    );
    assert_eq!(paths.get("CPATH")[0], PathBuf::from("/store/rust/include"));
  }

  #[test]
  fn loader_path_only_covers_runtime_libs() {
    let paths = SearchPaths::from_set(&set());
    assert_eq!(
      paths.get("LD_LIBRARY_PATH"),
      [PathBuf::from("/store/openssl/lib"), PathBuf::from("/store/gtk3/lib")]
    );
  }

  #[test]
  fn host_dependencies_add_nothing() {
    let only_host = DependencySet {
      build_tools: vec![Dependency::host("cc")],
      ..Default::default()
    };
    let paths = SearchPaths::from_set(&only_host);
    assert!(paths.to_env().is_empty());
    assert!(paths.joined("PATH", None).is_none());
  }

  #[cfg(unix)]
  #[test]
  fn joined_appends_inherited_value() {
    let paths = SearchPaths::from_set(&set());
    let inherited = OsString::from("/usr/bin:/bin");
    assert_eq!(
      paths.joined("PATH", Some(&inherited)).unwrap(),
      "/store/rust/bin:/store/openssl/bin:/store/gtk3/bin:/usr/bin:/bin"
    );
  }
}
