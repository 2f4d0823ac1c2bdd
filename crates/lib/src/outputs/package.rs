//! The package output: a `cargo build` of the flake's crate.
//!
//! Built packages live at `<store>/pkg/<name>-<hash>/` where the hash covers
//! the whole [`PackageSpec`]. Binaries are copied to `bin/`, then the hooks
//! run in order, then the completion marker is written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compose::{BuildHook, DependencySet, SearchPaths};
use crate::consts::{COMPLETE_MARKER, SOURCE_DATE_EPOCH};
use crate::execute::{execute_cmd, run_isolated};
use crate::platform::SystemId;
use crate::toolchain::{Installer, ManifestSource, ToolchainBundle};
use crate::util::hash::{Hashable, ObjectHash};

use super::types::{BuildOptions, DeriveError};

/// Leading cargo arguments every package build gets.
pub const DEFAULT_CARGO_ARGS: &[&str] = &["build", "--release"];

/// A fully derived package build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
  pub system: SystemId,
  pub name: String,
  pub src: PathBuf,
  pub toolchain: ToolchainBundle,
  pub deps: DependencySet,
  pub features: Vec<String>,
  pub cargo_args: Vec<String>,
  pub bins: Vec<String>,
  pub env: BTreeMap<String, String>,
}

impl Hashable for PackageSpec {}

/// Cargo arguments for `build`: the defaults, the feature selection, then the
/// user's flags.
///
/// `--no-default-features` is only passed when the flake replaces the
/// crate's default features itself.
pub fn cargo_args(build: &BuildOptions) -> Vec<String> {
  let mut args: Vec<String> = DEFAULT_CARGO_ARGS.iter().map(|a| a.to_string()).collect();
  if !build.keeps_crate_defaults() {
    args.push("--no-default-features".to_string());
  }
  let features = build.cargo_features();
  if !features.is_empty() {
    args.push("--features".to_string());
    args.push(features.join(","));
  }
  args.extend(build.cargo_flags.iter().cloned());
  args
}

impl PackageSpec {
  pub fn out_dir(&self, store_dir: &Path) -> Result<PathBuf, DeriveError> {
    let hash = self.compute_hash()?;
    Ok(store_dir.join("pkg").join(format!("{}-{}", self.name, hash)))
  }

  pub fn search_paths(&self) -> SearchPaths {
    SearchPaths::from_set(&self.deps)
  }

  /// Directory cargo leaves release binaries in, honouring `--target`.
  fn profile_dir(&self, target_dir: &Path) -> PathBuf {
    let mut args = self.cargo_args.iter();
    let mut triple = None;
    while let Some(arg) = args.next() {
      if arg == "--target" {
        triple = args.next().map(String::as_str);
      } else if let Some(t) = arg.strip_prefix("--target=") {
        triple = Some(t);
      }
    }
    match triple {
      Some(triple) => target_dir.join(triple).join("release"),
      None => target_dir.join("release"),
    }
  }

  /// The complete process environment of the build.
  ///
  /// The caller's `PATH` is appended after the store paths so host-provided
  /// dependencies stay reachable; nothing else is inherited.
  pub fn build_env(&self, build_dir: &Path, cache_dir: &Path) -> BTreeMap<String, String> {
    let paths = self.search_paths();
    let mut env = paths.to_env();

    if let Some(path) = paths.joined("PATH", std::env::var_os("PATH").as_ref()) {
      env.insert("PATH".to_string(), path);
    }
    env.insert("HOME".to_string(), build_dir.join("home").display().to_string());
    env.insert("CARGO_HOME".to_string(), cache_dir.join("cargo").display().to_string());
    env.insert(
      "CARGO_TARGET_DIR".to_string(),
      build_dir.join("target").display().to_string(),
    );
    env.insert("TMPDIR".to_string(), build_dir.join("tmp").display().to_string());
    env.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
    env.insert("LANG".to_string(), "C".to_string());

    for (key, value) in &self.env {
      env.insert(key.clone(), value.clone());
    }
    env
  }
}

/// Result of building a package.
#[derive(Debug, Clone)]
pub struct PackageResult {
  pub hash: ObjectHash,
  pub out_dir: PathBuf,
  pub bins: Vec<PathBuf>,
  /// True when a complete build was already in the store.
  pub cached: bool,
}

/// Install the toolchain and build `spec` into the store.
pub async fn build_package<S: ManifestSource>(
  spec: &PackageSpec,
  source: &S,
  store_dir: &Path,
  cache_dir: &Path,
) -> Result<PackageResult, DeriveError> {
  let hash = spec.compute_hash()?;
  let out_dir = spec.out_dir(store_dir)?;
  let bins = |dir: &Path| spec.bins.iter().map(|b| dir.join("bin").join(b)).collect::<Vec<_>>();

  if tokio::fs::try_exists(out_dir.join(COMPLETE_MARKER)).await? {
    info!(name = %spec.name, hash = %hash, "package already built");
    return Ok(PackageResult {
      bins: bins(&out_dir),
      hash,
      out_dir,
      cached: true,
    });
  }

  let installer = Installer::new(source, store_dir, cache_dir);
  let toolchain = installer.install(&spec.toolchain).await?;

  let staging = store_dir.join("pkg").join(format!(".{}-{}.tmp", spec.name, hash));
  if tokio::fs::try_exists(&staging).await? {
    tokio::fs::remove_dir_all(&staging).await?;
  }
  let build_dir = staging.join("build");
  let stage_out = staging.join("out");
  for dir in [build_dir.join("home"), build_dir.join("tmp"), stage_out.join("bin")] {
    tokio::fs::create_dir_all(dir).await?;
  }

  let env = spec.build_env(&build_dir, cache_dir);
  let cargo = toolchain.join("bin").join(exe_name("cargo"));
  info!(name = %spec.name, features = ?spec.features, "building package");
  run_isolated(&cargo, &spec.cargo_args, &env, &spec.src).await?;

  let profile_dir = spec.profile_dir(&build_dir.join("target"));
  for bin in &spec.bins {
    let built = profile_dir.join(exe_name(bin));
    if !tokio::fs::try_exists(&built).await? {
      return Err(DeriveError::MissingBinary {
        name: bin.clone(),
        path: profile_dir,
      });
    }
    tokio::fs::copy(&built, stage_out.join("bin").join(exe_name(bin))).await?;
  }

  run_hooks(spec, &stage_out, &env).await?;

  tokio::fs::remove_dir_all(&build_dir).await?;
  if tokio::fs::try_exists(&out_dir).await? {
    tokio::fs::remove_dir_all(&out_dir).await?;
  }
  tokio::fs::rename(&stage_out, &out_dir).await?;
  tokio::fs::remove_dir_all(&staging).await?;

  // Hooks may embed the staging path; point them at the final location.
  for hook in &spec.deps.hooks {
    if let BuildHook::WrapProgram { program } = hook {
      write_wrapper(&out_dir, program, &spec.search_paths()).await?;
    }
  }
  tokio::fs::write(out_dir.join(COMPLETE_MARKER), hash.0.as_bytes()).await?;

  info!(out = %out_dir.display(), "package built");
  Ok(PackageResult {
    bins: bins(&out_dir),
    hash,
    out_dir,
    cached: false,
  })
}

async fn run_hooks(spec: &PackageSpec, out_dir: &Path, build_env: &BTreeMap<String, String>) -> Result<(), DeriveError> {
  let paths = spec.search_paths();
  for hook in &spec.deps.hooks {
    match hook {
      BuildHook::WrapProgram { program } => {
        debug!(program = %program, "wrapping program");
        let wrapped = out_dir.join("bin").join(wrapped_name(program));
        let original = out_dir.join("bin").join(exe_name(program));
        if !tokio::fs::try_exists(&original).await? {
          return Err(DeriveError::MissingBinary {
            name: program.clone(),
            path: out_dir.join("bin"),
          });
        }
        tokio::fs::rename(&original, &wrapped).await?;
        write_wrapper(out_dir, program, &paths).await?;
      }
      BuildHook::Cmd { cmd } => {
        let mut env = build_env.clone();
        env.insert("out".to_string(), out_dir.display().to_string());
        execute_cmd(cmd, &env, out_dir).await?;
      }
    }
  }
  Ok(())
}

fn wrapped_name(program: &str) -> String {
  format!(".{}-wrapped", exe_name(program))
}

#[cfg(windows)]
fn exe_name(name: &str) -> String {
  format!("{}.exe", name)
}

#[cfg(not(windows))]
fn exe_name(name: &str) -> String {
  name.to_string()
}

/// Shell script that extends the loader and data search paths, then runs the
/// wrapped binary.
pub fn wrapper_script(target: &Path, paths: &SearchPaths) -> String {
  let mut script = String::from("#!/bin/sh\n");
  for var in ["LD_LIBRARY_PATH", "XDG_DATA_DIRS"] {
    if let Some(value) = paths.joined(var, None) {
      script.push_str(&format!(
        "export {var}={}\"${{{var}:+:${var}}}\"\n",
        sh_quote(&value)
      ));
    }
  }
  script.push_str(&format!("exec {} \"$@\"\n", sh_quote(&target.display().to_string())));
  script
}

async fn write_wrapper(out_dir: &Path, program: &str, paths: &SearchPaths) -> std::io::Result<()> {
  let bin_dir = out_dir.join("bin");
  let script = wrapper_script(&bin_dir.join(wrapped_name(program)), paths);
  let path = bin_dir.join(exe_name(program));
  tokio::fs::write(&path, script).await?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;
  }
  Ok(())
}

/// Quote for POSIX sh.
pub(crate) fn sh_quote(value: &str) -> String {
  format!("'{}'", value.replace('\'', r"'\''"))
}
