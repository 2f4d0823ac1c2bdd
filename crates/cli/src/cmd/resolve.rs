//! Implementation of the `envflake resolve` command.

use std::path::Path;

use anyhow::{Context, Result};

use envflake_lib::flake::evaluate_system;
use envflake_lib::toolchain::Resolver;

use super::{Session, runtime};
use crate::output::{OutputFormat, print_item, print_json, print_stat, print_success};

pub fn cmd_resolve(file: &Path, system: Option<&str>, output: OutputFormat) -> Result<()> {
  let session = Session::load(file)?;
  let system = session.select_system(system)?;
  let ctx = session.context();

  let request = evaluate_system(&session.flake, system)
    .and_then(|def| def.into_request(&session.flake.dir))
    .with_context(|| format!("Failed to evaluate flake for {}", system))?;

  let resolver = Resolver::new(&session.source, &ctx.cache_dir);
  let bundle = runtime()?
    .block_on(resolver.resolve(&request.toolchain, &system))
    .context("Failed to resolve toolchain")?;

  if output.is_json() {
    return print_json(&bundle);
  }

  print_success(&format!("Resolved {} for {}", bundle.channel, system));
  print_stat("rustc", &bundle.rustc_version);
  print_stat("Date", &bundle.date);
  print_stat("Manifest", &bundle.manifest_sha256);
  print_stat("Host", &bundle.host);
  if !bundle.targets.is_empty() {
    print_stat("Targets", &bundle.targets.join(", "));
  }
  print_stat("Artifacts", &bundle.artifacts.len().to_string());
  for artifact in &bundle.artifacts {
    print_item(&format!("{} ({})", artifact.component, artifact.target));
  }
  Ok(())
}
