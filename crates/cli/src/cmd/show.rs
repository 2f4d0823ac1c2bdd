//! Implementation of the `envflake show` command.
//!
//! Derives the outputs of every declared system (or just `--system`) and
//! prints them. Nothing is installed or built.

use std::path::Path;

use anyhow::{Result, bail};

use envflake_lib::outputs::{Outputs, derive_all};
use envflake_lib::util::hash::Hashable;

use super::{Session, runtime};
use crate::output::{print_error, print_info, print_item, print_json, print_stat, truncate_hash};

pub fn cmd_show(file: &Path, system: Option<&str>, json: bool) -> Result<()> {
  let session = Session::load(file)?;
  let systems = match system {
    Some(name) => vec![session.select_system(Some(name))?],
    None => session.flake.systems.clone(),
  };
  let ctx = session.context();
  let rt = runtime()?;

  let results = rt.block_on(derive_all(&session.flake, &systems, &ctx));

  let mut derived: Vec<Outputs> = Vec::new();
  let mut failures = 0;
  for (system, result) in results {
    match result {
      Ok(outputs) => derived.push(outputs),
      Err(e) => {
        failures += 1;
        print_error(&format!("{}: {}", system, e));
      }
    }
  }

  if json {
    print_json(&derived)?;
  } else {
    for outputs in &derived {
      print_outputs(outputs)?;
    }
  }

  if failures > 0 {
    bail!("{} of {} system(s) failed", failures, systems.len());
  }
  Ok(())
}

fn print_outputs(outputs: &Outputs) -> Result<()> {
  let package = &outputs.package;
  let shell = &outputs.shell;

  print_info(&outputs.system.to_string());
  println!("  package {} ({})", package.name, truncate_hash(&package.compute_hash()?.0));
  print_stat("Toolchain", &format!("{} ({})", package.toolchain.channel, package.toolchain.rustc_version));
  print_stat("Components", &package.toolchain.components.join(", "));
  print_stat("Features", &package.features.join(", "));
  print_stat("Cargo", &package.cargo_args.join(" "));
  print_stat("Build tools", &names(package.deps.build_tools.iter().map(|d| d.name.as_str())));
  print_stat("Runtime libs", &names(package.deps.runtime_libs.iter().map(|d| d.name.as_str())));
  print_stat("Hooks", &package.deps.hooks.len().to_string());
  for (key, value) in &package.env {
    print_item(&format!("{}={}", key, value));
  }

  println!("  shell ({})", truncate_hash(&shell.compute_hash()?.0));
  print_stat("Components", &shell.toolchain.components.join(", "));
  print_stat("Tools", &names(shell.tools.iter().map(|d| d.name.as_str())));
  Ok(())
}

fn names<'a>(names: impl Iterator<Item = &'a str>) -> String {
  names.collect::<Vec<_>>().join(", ")
}
