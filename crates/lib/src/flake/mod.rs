//! Flake loading and evaluation.
//!
//! The flake file (`envflake.lua`) declares the systems it supports and an
//! `outputs(system)` function describing the toolchain, dependencies,
//! package and shell for each of them.

mod eval;
mod types;

use std::path::PathBuf;

use mlua::prelude::LuaError;

use crate::platform::PlatformError;
use crate::toolchain::ToolchainError;

pub use eval::{Flake, evaluate_system, load_flake};
pub use types::*;

/// Errors that can occur during flake evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  #[error("lua error: {0}")]
  Lua(#[from] LuaError),

  #[error("cannot read flake {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid flake: {0}")]
  Invalid(String),

  #[error("system {0} is not declared by the flake")]
  UndeclaredSystem(String),

  #[error(transparent)]
  Platform(#[from] PlatformError),

  #[error(transparent)]
  Toolchain(#[from] ToolchainError),
}
