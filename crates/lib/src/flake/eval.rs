//! Flake file evaluation.
//!
//! A flake is a Lua file returning
//!
//! ```lua
//! return {
//!   systems = { "x86_64-linux", "aarch64-darwin" },
//!   outputs = function(system)
//!     return { toolchain = { ... }, deps = { ... }, package = { ... }, shell = { ... } }
//!   end,
//! }
//! ```
//!
//! Each system is evaluated in its own fresh Lua state, so nothing computed
//! for one system can leak into another.

use std::path::{Path, PathBuf};

use mlua::prelude::*;
use tracing::{debug, info};

use crate::platform::SystemId;

use super::EvalError;
use super::types::FlakeDef;

/// A loaded flake: its source and the systems it declares.
#[derive(Debug, Clone)]
pub struct Flake {
  pub path: PathBuf,
  pub dir: PathBuf,
  pub systems: Vec<SystemId>,
  source: String,
}

impl Flake {
  pub fn declares(&self, system: SystemId) -> bool {
    self.systems.contains(&system)
  }
}

/// Read a flake and collect its declared systems. Without a `systems` list
/// the flake applies to the current system only.
pub fn load_flake(path: &Path) -> Result<Flake, EvalError> {
  let read_err = |source: std::io::Error| EvalError::Read {
    path: path.to_path_buf(),
    source,
  };
  let canonical = dunce::canonicalize(path).map_err(read_err)?;
  let source = std::fs::read_to_string(&canonical).map_err(read_err)?;
  let dir = canonical.parent().unwrap_or(Path::new("")).to_path_buf();

  let lua = create_runtime(&dir, None)?;
  let table = eval_flake_table(&lua, &source, &canonical)?;

  let declared: Option<Vec<String>> = table.get("systems")?;
  let systems = match declared {
    Some(list) => {
      let mut systems = Vec::with_capacity(list.len());
      for name in list {
        let system: SystemId = name.parse()?;
        if !systems.contains(&system) {
          systems.push(system);
        }
      }
      systems
    }
    None => vec![SystemId::current().ok_or_else(|| EvalError::Invalid("unsupported host platform".to_string()))?],
  };

  info!(path = %canonical.display(), systems = systems.len(), "loaded flake");
  Ok(Flake {
    path: canonical,
    dir,
    systems,
    source,
  })
}

/// Evaluate `outputs(system)` in a fresh Lua state.
pub fn evaluate_system(flake: &Flake, system: SystemId) -> Result<FlakeDef, EvalError> {
  if !flake.declares(system) {
    return Err(EvalError::UndeclaredSystem(system.to_string()));
  }

  let lua = create_runtime(&flake.dir, Some(system))?;
  let table = eval_flake_table(&lua, &flake.source, &flake.path)?;
  let outputs: LuaFunction = table.get("outputs")?;
  let value: LuaValue = outputs.call(system.to_string())?;

  debug!(system = %system, "evaluated outputs");
  let def: FlakeDef = lua.from_value(value)?;
  Ok(def)
}

/// A Lua state with the `envflake` global registered.
///
/// `envflake.dir` is the flake directory. When evaluating for a system,
/// `envflake.system`, `os`, `arch` and `triple` describe it.
fn create_runtime(dir: &Path, system: Option<SystemId>) -> LuaResult<Lua> {
  let lua = Lua::new();
  let globals = lua.create_table()?;
  globals.set("dir", dir.to_string_lossy().to_string())?;

  if let Some(system) = system {
    globals.set("system", system.to_string())?;
    globals.set("os", system.os.as_str())?;
    globals.set("arch", system.arch.as_str())?;
    globals.set("triple", system.rust_triple())?;
  }

  lua.globals().set("envflake", globals)?;
  Ok(lua)
}

fn eval_flake_table(lua: &Lua, source: &str, path: &Path) -> Result<LuaTable, EvalError> {
  let value = lua
    .load(source)
    .set_name(format!("@{}", path.display()))
    .eval::<LuaValue>()?;

  let LuaValue::Table(table) = value else {
    return Err(EvalError::Invalid(format!(
      "{} must return a table with 'systems' and 'outputs'",
      path.display()
    )));
  };
  if !matches!(table.get::<LuaValue>("outputs")?, LuaValue::Function(_)) {
    return Err(EvalError::Invalid(format!(
      "{} must return a table with an 'outputs' function",
      path.display()
    )));
  }
  Ok(table)
}
