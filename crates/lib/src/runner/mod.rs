//! Parallel fastStructure runs over a range of K.
//!
//! Each K is one invocation of the installed `structure.py`, spread over a
//! bounded pool of workers. A failed run never stops the others; its output
//! is kept in `K<k>.stlog` next to the results so it can be inspected once
//! the sweep is over. After a clean sweep, [`choose_k`] picks the model.

mod choose_k;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::consts::{RUN_LOG_EXTENSION, RUN_OUTPUT_STEM};
use crate::install::{InstallError, join_inside};
use crate::manifest::Manifest;
use crate::platform;

pub use choose_k::{ChooseK, ChooseKError, KSummary, choose_k, count_components, parse_marginal_likelihood};

#[derive(Debug, Error)]
pub enum RunError {
  #[error("K must be at least 1")]
  ZeroK,

  #[error("empty K range: minimum {min} is above maximum {max}")]
  EmptyRange { min: u32, max: u32 },

  #[error("input file not found: {}", .0.display())]
  MissingInput(PathBuf),

  #[error("fastStructure is not installed: {}", .0.display())]
  NotInstalled(PathBuf),

  #[error("the target has no entry point to run")]
  NoEntryPoint,

  #[error(transparent)]
  Path(#[from] InstallError),

  #[error("output path {} is a file, expected a directory", .0.display())]
  OutputIsFile(PathBuf),

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RunError + '_ {
  move |source| RunError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Input formats fastStructure reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
  /// STRUCTURE text format, `<stem>.str`.
  Str,
  /// PLINK binary, `<stem>.bed` with `.bim` and `.fam`.
  Bed,
}

impl InputFormat {
  pub fn as_str(&self) -> &'static str {
    match self {
      InputFormat::Str => "str",
      InputFormat::Bed => "bed",
    }
  }
}

/// Turn an input file into the stem and format fastStructure expects.
///
/// fastStructure appends the extension itself. A STRUCTURE file without a
/// `.str` extension gets a `<input>.str` link beside it.
pub fn prepare_input(input: &Path) -> Result<(PathBuf, InputFormat), RunError> {
  if !input.is_file() {
    return Err(RunError::MissingInput(input.to_path_buf()));
  }

  let extension = input
    .extension()
    .and_then(|e| e.to_str())
    .map(str::to_ascii_lowercase);

  match extension.as_deref() {
    Some("bed" | "bim" | "fam") => Ok((input.with_extension(""), InputFormat::Bed)),
    Some("str") => Ok((input.with_extension(""), InputFormat::Str)),
    _ => {
      let mut linked = input.as_os_str().to_owned();
      linked.push(".str");
      let linked = PathBuf::from(linked);
      if std::fs::symlink_metadata(&linked).is_err() {
        debug!(input = ?input, link = ?linked, "linking input with .str extension");
        platform::link_file(input, &linked).map_err(io_err(&linked))?;
      }
      Ok((input.to_path_buf(), InputFormat::Str))
    }
  }
}

/// Path of the installed target's entry point under `prefix`.
pub fn installed_entry_point(prefix: &Path, manifest: &Manifest) -> Result<PathBuf, RunError> {
  let target = &manifest.target;
  let entry = target.entry_point.as_deref().ok_or(RunError::NoEntryPoint)?;
  let path = join_inside(&join_inside(prefix, &target.dir_name())?, entry)?;
  if !path.is_file() {
    return Err(RunError::NotInstalled(path));
  }
  Ok(path)
}

/// One sweep over `min_k..=max_k`.
#[derive(Debug, Clone)]
pub struct RunOptions {
  /// Interpreter that runs the entry point.
  pub python: String,
  pub entry_point: PathBuf,
  pub input: PathBuf,
  /// Results directory, created if missing.
  pub output: PathBuf,
  pub min_k: u32,
  pub max_k: u32,
  /// Concurrent runs.
  pub threads: usize,
  /// Keep a log for every run, not only the failed ones.
  pub log_all: bool,
  /// Passed to every run after the standard arguments.
  pub extra_args: Vec<String>,
  /// Exact environment of every run.
  pub env: BTreeMap<String, String>,
}

/// Outcome of the run for one K.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
  pub k: u32,
  pub success: bool,
  /// `None` when the run was killed by a signal or never started.
  pub exit_code: Option<i32>,
  pub log: Option<PathBuf>,
  pub duration: Duration,
}

/// Outcome of a whole sweep, ordered by K.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub output: PathBuf,
  pub format: InputFormat,
  pub runs: Vec<RunOutcome>,
  pub duration: Duration,
}

impl RunReport {
  pub fn failures(&self) -> impl Iterator<Item = &RunOutcome> {
    self.runs.iter().filter(|r| !r.success)
  }

  pub fn ok(&self) -> bool {
    self.failures().next().is_none()
  }
}

/// Everything a worker needs to run one K.
struct Job {
  k: u32,
  python: String,
  args: Vec<OsString>,
  output: PathBuf,
  env: BTreeMap<String, String>,
  log_all: bool,
}

impl Job {
  fn command_line(&self) -> String {
    let mut line = self.python.clone();
    for arg in &self.args {
      line.push(' ');
      line.push_str(&arg.to_string_lossy());
    }
    line
  }
}

/// Run fastStructure for every K in the range, at most `threads` at a time.
pub async fn run_all(options: &RunOptions) -> Result<RunReport, RunError> {
  let started = Instant::now();

  if options.min_k == 0 {
    return Err(RunError::ZeroK);
  }
  if options.min_k > options.max_k {
    return Err(RunError::EmptyRange {
      min: options.min_k,
      max: options.max_k,
    });
  }
  if !options.entry_point.is_file() {
    return Err(RunError::NotInstalled(options.entry_point.clone()));
  }
  if options.output.is_file() {
    return Err(RunError::OutputIsFile(options.output.clone()));
  }

  let input = dunce::canonicalize(&options.input).map_err(|_| RunError::MissingInput(options.input.clone()))?;
  let (stem, format) = prepare_input(&input)?;

  std::fs::create_dir_all(&options.output).map_err(io_err(&options.output))?;
  let output = dunce::canonicalize(&options.output).map_err(io_err(&options.output))?;
  let results = output.join(RUN_OUTPUT_STEM);

  let threads = options.threads.max(1);
  info!(
    input = ?input,
    output = ?output,
    format = format.as_str(),
    min_k = options.min_k,
    max_k = options.max_k,
    threads,
    "starting fastStructure runs"
  );

  let semaphore = Arc::new(Semaphore::new(threads));
  let mut join_set = JoinSet::new();

  // Larger K run longest; start them first.
  for k in (options.min_k..=options.max_k).rev() {
    let mut args: Vec<OsString> = vec![
      options.entry_point.clone().into(),
      "-K".into(),
      k.to_string().into(),
      "--input".into(),
      stem.clone().into(),
      "--output".into(),
      results.clone().into(),
      "--format".into(),
      format.as_str().into(),
    ];
    args.extend(options.extra_args.iter().map(OsString::from));

    let job = Job {
      k,
      python: options.python.clone(),
      args,
      output: output.clone(),
      env: options.env.clone(),
      log_all: options.log_all,
    };
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      let Ok(_permit) = semaphore.acquire().await else {
        return abandoned(job.k);
      };
      run_one(job).await
    });
  }

  let mut runs = Vec::new();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(outcome) => runs.push(outcome),
      Err(e) => error!(error = %e, "fastStructure worker panicked"),
    }
  }
  runs.sort_by_key(|r| r.k);

  let report = RunReport {
    output,
    format,
    runs,
    duration: started.elapsed(),
  };
  info!(
    runs = report.runs.len(),
    failed = report.failures().count(),
    "fastStructure runs finished"
  );
  Ok(report)
}

fn abandoned(k: u32) -> RunOutcome {
  RunOutcome {
    k,
    success: false,
    exit_code: None,
    log: None,
    duration: Duration::ZERO,
  }
}

async fn run_one(job: Job) -> RunOutcome {
  let started = Instant::now();
  let line = job.command_line();
  info!(k = job.k, cmd = %line, "running");

  let result = Command::new(&job.python)
    .args(&job.args)
    .current_dir(&job.output)
    .env_clear()
    .envs(&job.env)
    .stdin(Stdio::null())
    .output()
    .await;

  let (success, exit_code, body) = match result {
    Ok(output) => (
      output.status.success(),
      output.status.code(),
      format!(
        "--- stdout ---\n{}\n--- stderr ---\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
      ),
    ),
    Err(err) => (false, None, format!("failed to start {}: {err}\n", job.python)),
  };

  let log = if success && !job.log_all {
    None
  } else {
    let path = job.output.join(format!("K{}.{RUN_LOG_EXTENSION}", job.k));
    let exit = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
    let text = format!("$ {line}\nexit code: {exit}\n{body}");
    match tokio::fs::write(&path, text).await {
      Ok(()) => Some(path),
      Err(err) => {
        warn!(k = job.k, path = ?path, error = %err, "failed to write run log");
        None
      }
    }
  };

  if success {
    info!(k = job.k, "run complete");
  } else {
    warn!(k = job.k, exit_code = ?exit_code, log = ?log, "run failed");
  }

  RunOutcome {
    k: job.k,
    success,
    exit_code,
    log,
    duration: started.elapsed(),
  }
}

#[cfg(all(test, unix))]
mod tests;
