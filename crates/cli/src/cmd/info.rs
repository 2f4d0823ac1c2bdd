use anyhow::Result;

use envflake_lib::platform::paths::{cache_dir, store_dir};
use envflake_lib::platform::{SystemId, current_system};
use envflake_lib::toolchain::{DistSource, ManifestSource};

use crate::output::print_stat;

pub fn cmd_info() -> Result<()> {
  println!("System:");
  match current_system() {
    Some(system) => print_stat("Platform", &system),
    _ => println!("Could not detect platform."),
  }
  if let Some(system) = SystemId::current() {
    print_stat("Rust host", &system.rust_triple());
  }
  print_stat("Store", &store_dir().display().to_string());
  print_stat("Cache", &cache_dir().display().to_string());
  print_stat("Dist server", &DistSource::from_env().describe());
  Ok(())
}
