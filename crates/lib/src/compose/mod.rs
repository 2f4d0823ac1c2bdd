//! Environment composition.
//!
//! Turns a toolchain plus the declared dependencies into the single
//! [`DependencySet`] shared by the package build and the development shell.
//! Composition is concatenation with first-wins deduplication by name; the
//! order of the inputs is preserved exactly because linkers resolve in order.

mod paths;
mod types;

pub use paths::SearchPaths;
pub use types::*;

use tracing::debug;

/// Native libraries a GUI application built with GTK needs at build and run time.
pub const GUI_LIBRARIES: &[&str] = &[
  "gtk3",
  "glib",
  "gdk-pixbuf",
  "cairo",
  "pango",
  "atk",
  "libxkbcommon",
  "libGL",
  "wayland",
  "libX11",
  "libXcursor",
  "libXrandr",
  "libXi",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOptions {
  /// Append [`GUI_LIBRARIES`] and wrap each binary with a [`BuildHook::WrapProgram`].
  pub include_gui_deps: bool,
}

impl Default for ComposeOptions {
  fn default() -> Self {
    Self { include_gui_deps: true }
  }
}

/// Dependencies as declared by the flake, before composition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyDecls {
  pub build: Vec<Dependency>,
  pub runtime: Vec<Dependency>,
  pub hooks: Vec<BuildHook>,
}

/// Compose the dependency set for one system.
///
/// `toolchain` goes first among the build tools; `bins` are the package
/// binaries that receive a wrapper hook when GUI dependencies are enabled.
pub fn compose(toolchain: Dependency, decls: &DependencyDecls, bins: &[String], opts: &ComposeOptions) -> DependencySet {
  let mut set = DependencySet::default();

  set.push_build_tool(toolchain);
  for dep in &decls.build {
    if !set.push_build_tool(dep.clone()) {
      debug!(name = %dep.name, "dropping duplicate build tool");
    }
  }

  for dep in &decls.runtime {
    if !set.push_runtime_lib(dep.clone()) {
      debug!(name = %dep.name, "dropping duplicate runtime library");
    }
  }

  for hook in &decls.hooks {
    set.push_hook(hook.clone());
  }

  if opts.include_gui_deps {
    for name in GUI_LIBRARIES {
      set.push_runtime_lib(Dependency::host(*name));
    }
    for bin in bins {
      set.push_hook(BuildHook::WrapProgram { program: bin.clone() });
    }
  }

  debug!(
    build_tools = set.build_tools.len(),
    runtime_libs = set.runtime_libs.len(),
    hooks = set.hooks.len(),
    "composed dependency set"
  );
  set
}
