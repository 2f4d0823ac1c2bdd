mod info;
mod package;
mod resolve;
mod shell;
mod show;

pub use info::cmd_info;
pub use package::cmd_package;
pub use resolve::cmd_resolve;
pub use shell::cmd_shell;
pub use show::cmd_show;

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use envflake_lib::config::FsConfigSource;
use envflake_lib::flake::{Flake, load_flake};
use envflake_lib::outputs::DeriveContext;
use envflake_lib::platform::SystemId;
use envflake_lib::platform::paths::{cache_dir, store_dir};
use envflake_lib::toolchain::{DistSource, ManifestSource};

/// Everything a command needs to derive outputs from a flake.
pub(crate) struct Session {
  pub flake: Flake,
  pub source: DistSource,
  pub config: FsConfigSource,
}

impl Session {
  pub fn load(file: &Path) -> Result<Self> {
    let flake = load_flake(file).with_context(|| format!("Failed to load flake: {}", file.display()))?;
    let config = FsConfigSource::new(flake.dir.clone());
    let source = DistSource::from_env();
    debug!(flake = %flake.path.display(), source = %source.describe(), "session loaded");
    Ok(Self {
      flake,
      source,
      config,
    })
  }

  pub fn context(&self) -> DeriveContext<'_, DistSource, FsConfigSource> {
    DeriveContext::new(&self.source, &self.config, &store_dir(), &cache_dir())
  }

  /// The `--system` argument, or the current system. Either must be declared
  /// by the flake.
  pub fn select_system(&self, system: Option<&str>) -> Result<SystemId> {
    let system = match system {
      Some(name) => name.parse().with_context(|| format!("Invalid system: {}", name))?,
      None => SystemId::current().ok_or_else(|| anyhow!("Unsupported host platform"))?,
    };
    if !self.flake.declares(system) {
      let declared: Vec<String> = self.flake.systems.iter().map(ToString::to_string).collect();
      return Err(anyhow!(
        "System {} is not declared by {} (declared: {})",
        system,
        self.flake.path.display(),
        declared.join(", ")
      ));
    }
    Ok(system)
  }
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
