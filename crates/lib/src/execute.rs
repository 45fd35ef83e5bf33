//! Build step execution through the platform shell.
//!
//! Every step runs with exactly the variables of the build environment: the
//! child's environment is cleared first, and the provisioner's own process
//! environment is never touched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Lines of captured stderr kept on failure.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("command failed with exit code {}: {cmd}", code.map(|c| c.to_string()).unwrap_or_else(|| "none (killed by signal)".to_string()))]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    /// Tail of stderr when output was captured, empty otherwise.
    stderr: String,
  },

  #[error("working directory does not exist: {}", .0.display())]
  MissingCwd(PathBuf),

  #[error("failed to spawn '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },
}

impl ExecuteError {
  /// Exit code of the failed command, if it exited normally.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      ExecuteError::CmdFailed { code, .. } => *code,
      _ => None,
    }
  }
}

/// Where a step's stdout and stderr go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
  /// Stream straight to the operator's terminal.
  #[default]
  Inherit,
  /// Collect; stdout is returned and stderr is logged at debug level.
  Capture,
}

/// Run `cmd` through the shell in `cwd` with exactly `vars` as its environment.
///
/// Returns the trimmed stdout in [`OutputMode::Capture`], an empty string otherwise.
pub async fn run_step(
  cmd: &str,
  cwd: &Path,
  vars: &BTreeMap<String, String>,
  output: OutputMode,
) -> Result<String, ExecuteError> {
  info!(cmd = %cmd, "executing command");

  if !cwd.is_dir() {
    return Err(ExecuteError::MissingCwd(cwd.to_path_buf()));
  }

  let (shell_cmd, shell_args) = get_shell();

  let mut command = Command::new(shell_cmd);
  command
    .args(shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .env_clear()
    .envs(vars)
    .stdin(Stdio::null());

  debug!(shell = %shell_cmd, working_dir = ?cwd, vars = vars.len(), "spawning process");

  let spawn_err = |source| ExecuteError::Spawn {
    cmd: cmd.to_string(),
    source,
  };

  match output {
    OutputMode::Inherit => {
      let status = command
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(spawn_err)?;

      if !status.success() {
        return Err(ExecuteError::CmdFailed {
          cmd: cmd.to_string(),
          code: status.code(),
          stderr: String::new(),
        });
      }

      Ok(String::new())
    }
    OutputMode::Capture => {
      let output = command.output().await.map_err(spawn_err)?;
      let stdout = String::from_utf8_lossy(&output.stdout);
      let stderr = String::from_utf8_lossy(&output.stderr);

      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }

      if !output.status.success() {
        if !stdout.is_empty() {
          debug!(stdout = %stdout, "command stdout");
        }

        return Err(ExecuteError::CmdFailed {
          cmd: cmd.to_string(),
          code: output.status.code(),
          stderr: tail(&stderr, STDERR_TAIL_LINES),
        });
      }

      let stdout = stdout.trim().to_string();
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "command output");
      }

      Ok(stdout)
    }
  }
}

fn tail(text: &str, lines: usize) -> String {
  let all: Vec<&str> = text.trim_end().lines().collect();
  let start = all.len().saturating_sub(lines);
  all[start..].join("\n")
}

/// Shell and arguments used to run a step on this platform.
///
/// Always the system shell, never `$SHELL`: interactive shells may source
/// profile files that edit the environment behind the build's back.
pub fn get_shell() -> (&'static str, &'static [&'static str]) {
  #[cfg(unix)]
  {
    ("/bin/sh", &["-c"])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe",
      &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"],
    )
  }
}
