//! Implementation of the `envflake package` command.
//!
//! Derives the package output for one system and builds it into the
//! store. A package that is already complete in the store is not rebuilt.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use envflake_lib::outputs::{build_package, derive_system_package};

use super::{Session, runtime};
use crate::output::{OutputFormat, format_duration, print_item, print_json, print_stat, print_success, truncate_hash};

#[derive(Serialize)]
struct PackageOutput {
  system: String,
  hash: String,
  out: String,
  bins: Vec<String>,
  cached: bool,
}

pub fn cmd_package(file: &Path, system: Option<&str>, output: OutputFormat) -> Result<()> {
  let session = Session::load(file)?;
  let system = session.select_system(system)?;
  let ctx = session.context();
  let rt = runtime()?;

  let started = Instant::now();
  let package = rt
    .block_on(derive_system_package(&session.flake, system, &ctx))
    .with_context(|| format!("Failed to derive package for {}", system))?;
  info!(system = %system, store = %ctx.store_dir.display(), "building package");

  let result = rt
    .block_on(build_package(&package, &session.source, &ctx.store_dir, &ctx.cache_dir))
    .with_context(|| format!("Failed to build {}", package.name))?;

  if output.is_json() {
    return print_json(&PackageOutput {
      system: system.to_string(),
      hash: result.hash.0.clone(),
      out: result.out_dir.display().to_string(),
      bins: result.bins.iter().map(|b| b.display().to_string()).collect(),
      cached: result.cached,
    });
  }

  let verb = if result.cached { "Already built" } else { "Built" };
  print_success(&format!(
    "{} {} ({}) in {}",
    verb,
    package.name,
    truncate_hash(&result.hash.0),
    format_duration(started.elapsed())
  ));
  print_stat("Out", &result.out_dir.display().to_string());
  print_stat("Toolchain", &package.toolchain.rustc_version);
  print_stat("Features", &package.features.join(", "));
  print_stat("Binaries", &result.bins.len().to_string());
  for bin in &result.bins {
    print_item(&bin.display().to_string());
  }

  Ok(())
}
