//! Rust toolchain selection and installation.
//!
//! A [`ToolchainSpec`] is turned into a [`ToolchainBundle`] by reading the
//! upstream channel manifest, then the bundle is installed into the store.
//!
//! # Submodules
//!
//! - [`source`] - Where manifests and archives are fetched from
//! - [`manifest`] - The v2 channel manifest format
//! - [`resolve`] - Pinned and floating resolution
//! - [`install`] - Download, verify and unpack into the store

pub mod install;
pub mod manifest;
pub mod resolve;
pub mod source;
mod types;

pub use install::{Installer, toolchain_dir};
pub use resolve::{ManifestCache, Resolver};
pub use source::{DirSource, DistSource, HttpSource, ManifestSource, SourceError};
pub use types::*;
