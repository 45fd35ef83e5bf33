//! Types for provisioning runs.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::consts::DEFAULT_PYTHON;
use crate::execute::{ExecuteError, OutputMode};
use crate::fetch::FetchError;
use crate::install::InstallError;
use crate::lock::LockError;
use crate::manifest::Manifest;
use crate::placeholder::PlaceholderError;
use crate::platform::paths;
use crate::prefix_lock::PrefixLockError;
use crate::receipt::ReceiptError;
use crate::unpack::UnpackError;
use crate::util::hash::HashError;

/// Caller-supplied configuration for a provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
  /// Installation directory. Made absolute during prepare.
  pub prefix: PathBuf,
  /// Caller-owned staging directory. `None` uses a scoped temporary one.
  pub staging: Option<PathBuf>,
  /// Keep the scoped staging directory instead of removing it.
  pub keep_staging: bool,
  /// Persistent archive cache, also home of the checksum lock.
  pub download_dir: PathBuf,
  /// Interpreter override; beats the manifest setting.
  pub python: Option<String>,
  /// Parallelism override; beats the manifest setting.
  pub jobs: Option<usize>,
  pub output: OutputMode,
  /// Recorded in the prefix lock so contention errors can name the holder.
  pub command: String,
}

impl Default for ProvisionOptions {
  fn default() -> Self {
    Self {
      prefix: paths::default_prefix(),
      staging: None,
      keep_staging: false,
      download_dir: paths::default_download_dir(),
      python: None,
      jobs: None,
      output: OutputMode::Inherit,
      command: "fsprov install".to_string(),
    }
  }
}

/// Values substituted for `$${python}` and `$${jobs}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSettings {
  pub python: String,
  pub jobs: usize,
}

impl BuildSettings {
  /// Layer CLI overrides over the manifest settings over the defaults.
  pub fn resolve(options: &ProvisionOptions, manifest: &Manifest) -> Self {
    let python = options
      .python
      .clone()
      .or_else(|| manifest.settings.python.clone())
      .unwrap_or_else(|| DEFAULT_PYTHON.to_string());

    let jobs = options
      .jobs
      .or(manifest.settings.jobs)
      .filter(|&n| n > 0)
      .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

    Self { python, jobs }
  }
}

/// Where a run stands. Transitions only forward, one descriptor at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
  /// Descriptor `i` is next (or running).
  Pending(usize),
  Done,
  /// Stopped at descriptor `index` (or at `n`, past the last one, when the
  /// receipt could not be written); nothing after it ran.
  Aborted { index: usize },
}

/// The stage of a descriptor's processing that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Fetch,
  Unpack,
  Build,
  Install,
  Relocate,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Phase::Fetch => "fetch",
      Phase::Unpack => "unpack",
      Phase::Build => "build",
      Phase::Install => "install",
      Phase::Relocate => "relocate",
    })
  }
}

/// Record of one completed descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
  pub name: String,
  pub version: String,
  pub archive: PathBuf,
  pub sha256: String,
  /// The archive was already in the download cache.
  pub cached: bool,
  pub duration: Duration,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
  pub prefix: PathBuf,
  pub steps: Vec<StepReport>,
  /// Link to the target's entry point, when it declares one.
  pub entry_point: Option<PathBuf>,
  pub receipt: PathBuf,
  /// Staging directory left on disk, if any.
  pub staging_kept: Option<PathBuf>,
  pub duration: Duration,
}

/// Failure inside one descriptor's processing.
#[derive(Debug, Error)]
pub enum StepError {
  #[error(transparent)]
  Placeholder(#[from] PlaceholderError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Unpack(#[from] UnpackError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error(transparent)]
  Install(#[from] InstallError),

  #[error(transparent)]
  Lock(#[from] LockError),
}

#[derive(Debug, Error)]
pub enum ProvisionError {
  #[error("failed to prepare {}", path.display())]
  Prepare {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  PrefixLock(#[from] PrefixLockError),

  #[error("failed to load checksum lock")]
  Lock(#[source] LockError),

  #[error("failed to create HTTP client")]
  Client(#[source] FetchError),

  #[error("{phase} failed for {package}")]
  Step {
    /// `name-version` of the failing descriptor.
    package: String,
    index: usize,
    phase: Phase,
    #[source]
    source: StepError,
  },

  #[error("failed to hash manifest")]
  Hash(#[source] HashError),

  #[error(transparent)]
  Receipt(#[from] ReceiptError),
}

impl ProvisionError {
  /// Exit status of the failed build command, if that is what failed.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      ProvisionError::Step {
        source: StepError::Execute(err),
        ..
      } => err.exit_code(),
      _ => None,
    }
  }

  /// Index of the descriptor that aborted the run.
  pub fn failed_index(&self) -> Option<usize> {
    match self {
      ProvisionError::Step { index, .. } => Some(*index),
      _ => None,
    }
  }
}
