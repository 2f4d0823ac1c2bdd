//! The development shell output.
//!
//! A shell sees the same dependency set and environment mapping as the
//! package build, with the shell's toolchain (which may carry extra
//! components) first on the search paths and the developer tools after the
//! dependencies. Entering a shell only sets process environment; it never
//! builds anything.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compose::{Dependency, DependencySet, SearchPaths};
use crate::toolchain::{Installer, ManifestSource, ToolchainBundle};
use crate::util::hash::Hashable;

use super::package::sh_quote;
use super::types::DeriveError;

/// Set in every shell so prompts and scripts can tell they are inside one.
pub const SHELL_MARKER_VAR: &str = "ENVFLAKE_SHELL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellSpec {
  pub system: crate::platform::SystemId,
  pub toolchain: ToolchainBundle,
  pub deps: DependencySet,
  pub tools: Vec<Dependency>,
  pub env: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hook: Option<String>,
}

impl Hashable for ShellSpec {}

impl ShellSpec {
  /// Search paths with the shell toolchain installed at `toolchain_prefix`.
  pub fn search_paths(&self, toolchain_prefix: &Path) -> SearchPaths {
    let mut view = DependencySet::default();
    // Same name as the package toolchain entry, so it takes that slot.
    view.push_build_tool(Dependency::at(self.toolchain.dependency_name(), toolchain_prefix));
    for dep in &self.deps.build_tools {
      view.push_build_tool(dep.clone());
    }
    for dep in &self.tools {
      view.push_build_tool(dep.clone());
    }
    for dep in &self.deps.runtime_libs {
      view.push_runtime_lib(dep.clone());
    }
    SearchPaths::from_set(&view)
  }

  /// Variables the shell sets outright (search paths are in [`Self::search_paths`]).
  /// The flake's own env comes last, as in the package build.
  pub fn plain_vars(&self, toolchain_prefix: &Path) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert(SHELL_MARKER_VAR.to_string(), self.system.to_string());
    if self.toolchain.components.iter().any(|c| c == "rust-src") {
      vars.insert(
        "RUST_SRC_PATH".to_string(),
        toolchain_prefix
          .join("lib/rustlib/src/rust/library")
          .display()
          .to_string(),
      );
    }
    vars.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    vars
  }
}

/// Shell dialects the environment can be printed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellKind {
  #[default]
  Posix,
  Fish,
}

impl ShellKind {
  /// Guess from a shell path such as `$SHELL`.
  pub fn from_shell_path(path: &str) -> Self {
    match Path::new(path).file_name().and_then(|n| n.to_str()) {
      Some("fish") => Self::Fish,
      _ => Self::Posix,
    }
  }
}

impl FromStr for ShellKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "posix" | "sh" | "bash" | "zsh" => Ok(Self::Posix),
      "fish" => Ok(Self::Fish),
      other => Err(format!("unsupported shell '{}', expected posix or fish", other)),
    }
  }
}

impl fmt::Display for ShellKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Posix => write!(f, "posix"),
      Self::Fish => write!(f, "fish"),
    }
  }
}

/// Render the shell environment as a script to `eval`/`source`.
///
/// Search paths are prepended to whatever the calling shell already has.
/// The shell hook, if any, comes last.
pub fn render_env_script(spec: &ShellSpec, toolchain_prefix: &Path, kind: ShellKind) -> String {
  let mut out = String::new();

  for (var, dirs) in spec.search_paths(toolchain_prefix).vars() {
    let dirs: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
    match kind {
      ShellKind::Posix => {
        let joined = std::env::join_paths(&dirs)
          .map(|j| j.to_string_lossy().to_string())
          .unwrap_or_else(|_| dirs.join(":"));
        out.push_str(&format!(
          "export {var}={}\"${{{var}:+:${var}}}\"\n",
          sh_quote(&joined)
        ));
      }
      ShellKind::Fish => {
        let quoted: Vec<String> = dirs.iter().map(|d| fish_quote(d)).collect();
        out.push_str(&format!("set -gx --path {var} {} ${var}\n", quoted.join(" ")));
      }
    }
  }

  for (key, value) in spec.plain_vars(toolchain_prefix) {
    match kind {
      ShellKind::Posix => out.push_str(&format!("export {}={}\n", key, sh_quote(&value))),
      ShellKind::Fish => out.push_str(&format!("set -gx {} {}\n", key, fish_quote(&value))),
    }
  }

  if let Some(hook) = &spec.hook {
    out.push_str(hook);
    if !hook.ends_with('\n') {
      out.push('\n');
    }
  }

  out
}

fn fish_quote(value: &str) -> String {
  format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}

/// The environment of a shell process: the caller's variables with the
/// search paths prepended and the shell variables set.
pub fn shell_env(spec: &ShellSpec, toolchain_prefix: &Path) -> BTreeMap<String, String> {
  let mut env: BTreeMap<String, String> = std::env::vars_os()
    .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
    .collect();

  let paths = spec.search_paths(toolchain_prefix);
  for (var, _) in paths.vars() {
    let inherited = std::env::var_os(var);
    if let Some(value) = paths.joined(var, inherited.as_ref()) {
      env.insert(var.to_string(), value);
    }
  }
  env.extend(spec.plain_vars(toolchain_prefix));
  env
}

/// Install the shell's toolchain and run `command` (or the user's shell)
/// inside the shell environment, returning its exit status.
pub async fn enter_shell<S: ManifestSource>(
  spec: &ShellSpec,
  source: &S,
  store_dir: &Path,
  cache_dir: &Path,
  command: Option<&[String]>,
) -> Result<ExitStatus, DeriveError> {
  let installer = Installer::new(source, store_dir, cache_dir);
  let prefix = installer.install(&spec.toolchain).await?;
  let env = shell_env(spec, &prefix);

  let (program, args) = match command {
    Some([program, args @ ..]) => (PathBuf::from(program), args.to_vec()),
    _ => (PathBuf::from(user_shell()), Vec::new()),
  };

  let mut cmd = match &spec.hook {
    // Run the hook first, then replace the hook's shell with the program.
    Some(hook) => {
      let mut cmd = tokio::process::Command::new("/bin/sh");
      cmd
        .arg("-c")
        .arg(format!("{}\nexec \"$0\" \"$@\"", hook))
        .arg(&program)
        .args(&args);
      cmd
    }
    None => {
      let mut cmd = tokio::process::Command::new(&program);
      cmd.args(&args);
      cmd
    }
  };

  info!(program = %program.display(), "entering shell");
  debug!(vars = env.len(), "shell environment");
  let status = cmd.env_clear().envs(&env).status().await?;
  Ok(status)
}

fn user_shell() -> String {
  match std::env::var("SHELL") {
    Ok(shell) if !shell.is_empty() => shell,
    _ => "/bin/sh".to_string(),
  }
}
