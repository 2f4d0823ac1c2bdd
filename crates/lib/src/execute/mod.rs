//! Process execution for package builds and hooks.

pub mod cmd;

pub use cmd::{execute_cmd, get_shell, run_isolated};

/// Errors that can occur while running a downstream process.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
  /// The process ran and exited unsuccessfully.
  #[error("{program} failed with exit code {code:?}:\n{stderr}")]
  BuildFailed {
    program: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The process could not be started.
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
}
