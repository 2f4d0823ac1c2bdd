//! Running downstream processes.
//!
//! Builds run in a cleared environment: only the variables handed in are
//! visible to the child, so nothing from the caller's shell leaks into a
//! package build.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::execute::ExecuteError;

/// Run `program` with `args` in `cwd` with exactly the variables in `env`.
///
/// Stdout and stderr are captured. A non-zero exit becomes
/// [`ExecuteError::BuildFailed`] carrying the exit code and stderr verbatim.
/// Returns stdout on success.
pub async fn run_isolated(
  program: &Path,
  args: &[String],
  env: &BTreeMap<String, String>,
  cwd: &Path,
) -> Result<String, ExecuteError> {
  info!(program = %program.display(), args = ?args, "running");

  let mut command = Command::new(program);
  command.args(args).current_dir(cwd).env_clear().envs(env);

  debug!(working_dir = %cwd.display(), vars = env.len(), "spawning process");

  let output = command.output().await.map_err(|source| ExecuteError::Spawn {
    program: program.display().to_string(),
    source,
  })?;

  let stderr = String::from_utf8_lossy(&output.stderr).to_string();
  let stdout = String::from_utf8_lossy(&output.stdout).to_string();

  if !output.status.success() {
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }
    return Err(ExecuteError::BuildFailed {
      program: program.display().to_string(),
      code: output.status.code(),
      stderr,
    });
  }

  if !stderr.is_empty() {
    debug!(stderr = %stderr, "command stderr");
  }

  Ok(stdout)
}

/// Execute a shell command string with the given environment.
///
/// The command runs under [`get_shell`]. Returns trimmed stdout.
pub async fn execute_cmd(cmd: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<String, ExecuteError> {
  let (shell, mut args) = get_shell();
  args.push(cmd.to_string());
  let stdout = run_isolated(Path::new(&shell), &args, env, cwd).await?;
  Ok(stdout.trim().to_string())
}

/// The plain shell hooks run under: `/bin/sh -c` on Unix, a profile-less
/// PowerShell on Windows. Login shells are avoided since their profile files
/// can rewrite the environment.
pub fn get_shell() -> (String, Vec<String>) {
  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec!["-NoProfile".to_string(), "-Command".to_string()],
    )
  }
}
