//! Output derivation.
//!
//! Every system gets exactly two outputs, a [`PackageSpec`] and a
//! [`ShellSpec`], sharing one composed
//! [`DependencySet`](crate::compose::DependencySet) and one environment.
//! The shell toolchain is the package toolchain's manifest with extra
//! components, so the package never depends on what the shell asks for.
//!
//! # Submodules
//!
//! - [`package`] - Package specs and the cargo build
//! - [`shell`] - Shell specs, env rendering and entering a shell

pub mod package;
pub mod shell;
mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::compose::{Dependency, compose};
use crate::config::{ConfigSource, FileReadError};
use crate::flake::{Flake, evaluate_system};
use crate::platform::SystemId;
use crate::toolchain::{ManifestSource, Resolver, toolchain_dir};

pub use package::{PackageResult, PackageSpec, build_package, cargo_args};
pub use shell::{ShellKind, ShellSpec, enter_shell, render_env_script};
pub use types::*;

/// Collaborators and locations a derivation uses.
pub struct DeriveContext<'a, S: ManifestSource, C: ConfigSource> {
  pub source: &'a S,
  pub config: &'a C,
  pub store_dir: PathBuf,
  pub cache_dir: PathBuf,
}

impl<'a, S: ManifestSource, C: ConfigSource> DeriveContext<'a, S, C> {
  pub fn new(source: &'a S, config: &'a C, store_dir: &Path, cache_dir: &Path) -> Self {
    Self {
      source,
      config,
      store_dir: store_dir.to_path_buf(),
      cache_dir: cache_dir.to_path_buf(),
    }
  }
}

/// Resolve every environment value, reading files through `config`.
pub fn read_env<C: ConfigSource>(
  env: &BTreeMap<String, EnvSource>,
  config: &C,
) -> Result<BTreeMap<String, String>, FileReadError> {
  env
    .iter()
    .map(|(key, source)| {
      let value = match source {
        EnvSource::Literal(value) => value.clone(),
        EnvSource::File(path) => config.read_text(path)?,
      };
      Ok((key.clone(), value))
    })
    .collect()
}

/// Derive the package output for `system`.
///
/// The environment files are read first, then the package toolchain is
/// resolved. Any error aborts the derivation before composition.
pub async fn derive_package<S: ManifestSource, C: ConfigSource>(
  request: &DeriveRequest,
  system: SystemId,
  ctx: &DeriveContext<'_, S, C>,
) -> Result<PackageSpec, DeriveError> {
  info!(system = %system, package = %request.build.name, "deriving package");

  let env = read_env(&request.build.env, ctx.config)?;

  let resolver = Resolver::new(ctx.source, &ctx.cache_dir);
  let toolchain = resolver.resolve(&request.toolchain, &system).await?;

  let toolchain_dep = Dependency::at(toolchain.dependency_name(), toolchain_dir(&ctx.store_dir, &toolchain)?);
  let deps = compose(toolchain_dep, &request.deps, &request.build.bins, &request.compose);

  Ok(PackageSpec {
    system,
    name: request.build.name.clone(),
    src: request.build.src.clone(),
    toolchain,
    deps,
    cargo_args: cargo_args(&request.build),
    features: request.build.effective_features(),
    bins: request.build.bins.clone(),
    env,
  })
}

/// Derive both outputs for `system`.
///
/// The package is derived first. The shell then adds its components from
/// the manifest the package toolchain came from, so a component only the
/// shell asks for can fail the shell but never changes the package.
pub async fn derive_outputs<S: ManifestSource, C: ConfigSource>(
  request: &DeriveRequest,
  system: SystemId,
  ctx: &DeriveContext<'_, S, C>,
) -> Result<Outputs, DeriveError> {
  let package = derive_package(request, system, ctx).await?;

  let shell_request = request.toolchain.clone().with_components(
    request
      .toolchain
      .components
      .iter()
      .chain(request.shell.components.iter())
      .cloned()
      .collect::<Vec<_>>(),
  );
  let shell_toolchain = Resolver::new(ctx.source, &ctx.cache_dir)
    .extend(&package.toolchain, &shell_request)
    .await?;

  let shell = ShellSpec {
    system,
    toolchain: shell_toolchain,
    deps: package.deps.clone(),
    tools: request.shell.tools.clone(),
    env: package.env.clone(),
    hook: request.shell.hook.clone(),
  };

  Ok(Outputs { system, package, shell })
}

/// Evaluate the flake for `system` and derive its outputs.
pub async fn derive_system<S: ManifestSource, C: ConfigSource>(
  flake: &Flake,
  system: SystemId,
  ctx: &DeriveContext<'_, S, C>,
) -> Result<Outputs, DeriveError> {
  let request = evaluate_system(flake, system)?.into_request(&flake.dir)?;
  derive_outputs(&request, system, ctx).await
}

/// Evaluate the flake for `system` and derive only its package.
pub async fn derive_system_package<S: ManifestSource, C: ConfigSource>(
  flake: &Flake,
  system: SystemId,
  ctx: &DeriveContext<'_, S, C>,
) -> Result<PackageSpec, DeriveError> {
  let request = evaluate_system(flake, system)?.into_request(&flake.dir)?;
  derive_package(&request, system, ctx).await
}

/// Derive outputs for each system independently. One system failing does
/// not affect the others.
pub async fn derive_all<S: ManifestSource, C: ConfigSource>(
  flake: &Flake,
  systems: &[SystemId],
  ctx: &DeriveContext<'_, S, C>,
) -> Vec<(SystemId, Result<Outputs, DeriveError>)> {
  let mut results = Vec::with_capacity(systems.len());
  for system in systems {
    results.push((*system, derive_system(flake, *system, ctx).await));
  }
  results
}
