//! Configuration sources read while evaluating a flake.
//!
//! Values such as the path forwarded to the build through an environment
//! variable are read from plain text files. Reading goes through
//! [`ConfigSource`] so a failure is a typed, testable [`FileReadError`].

mod source;

pub use source::{ConfigSource, FileReadError, FsConfigSource, strip_line_terminator};
