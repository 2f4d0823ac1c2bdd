//! envflake-lib: reproducible Rust build environments from a flake file
//!
//! This crate provides the pieces behind the `envflake` CLI:
//! - `toolchain`: resolve a pinned or floating Rust toolchain and install it
//! - `compose`: assemble the ordered, deduplicated dependency set
//! - `outputs`: derive the package build and the development shell
//! - `flake`: evaluate the Lua flake file per system

pub mod compose;
pub mod config;
pub mod consts;
pub mod execute;
pub mod flake;
pub mod outputs;
pub mod platform;
pub mod toolchain;
pub mod util;
