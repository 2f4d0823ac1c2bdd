//! Implementation of the `envflake shell` command.
//!
//! Spawns the development shell, or with `--print` writes the environment as
//! a script suitable for `eval "$(envflake shell --print)"`.

use std::path::Path;

use anyhow::{Context, Result, anyhow};

use envflake_lib::outputs::{ShellKind, derive_system, enter_shell, render_env_script};
use envflake_lib::toolchain::Installer;

use super::{Session, runtime};

pub fn cmd_shell(
  file: &Path,
  system: Option<&str>,
  print: bool,
  shell: Option<&str>,
  command: &[String],
) -> Result<()> {
  let session = Session::load(file)?;
  let system = session.select_system(system)?;
  let ctx = session.context();
  let rt = runtime()?;

  let outputs = rt
    .block_on(derive_system(&session.flake, system, &ctx))
    .with_context(|| format!("Failed to derive outputs for {}", system))?;

  if print {
    let kind = match shell {
      Some(name) => name.parse::<ShellKind>().map_err(|e| anyhow!(e))?,
      None => ShellKind::from_shell_path(&std::env::var("SHELL").unwrap_or_default()),
    };
    let installer = Installer::new(&session.source, &ctx.store_dir, &ctx.cache_dir);
    let prefix = rt
      .block_on(installer.install(&outputs.shell.toolchain))
      .context("Failed to install shell toolchain")?;
    print!("{}", render_env_script(&outputs.shell, &prefix, kind));
    return Ok(());
  }

  let command = (!command.is_empty()).then_some(command);
  let status = rt
    .block_on(enter_shell(
      &outputs.shell,
      &session.source,
      &ctx.store_dir,
      &ctx.cache_dir,
      command,
    ))
    .context("Failed to enter shell")?;

  if !status.success() {
    std::process::exit(status.code().unwrap_or(1));
  }
  Ok(())
}
