//! The provisioner: runs a manifest's chain to completion or stops at the
//! first failure.
//!
//! A run moves through the descriptors strictly in order:
//!
//! ```text
//! Pending(0) -> Pending(1) -> ... -> Pending(n) -> Done
//!      \             \                    \
//!       +-------------+--------------------+---> Aborted { index }
//! ```
//!
//! For each descriptor the provisioner fetches the archive into the download
//! cache, unpacks it into staging, applies its environment operations to the
//! shared [`BuildEnv`], runs its build steps and applies its install
//! operations. The target (the last descriptor) is additionally relocated
//! into the prefix and its entry point exposed under `bin/`.
//!
//! There is no retry and no rollback. The scoped staging directory is
//! reclaimed on every exit path.

mod plan;
mod resolver;
mod types;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::consts::CHECKSUM_LOCK_FILENAME;
use crate::env::{BuildEnv, EnvOp};
use crate::execute::run_step;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::install;
use crate::lock::ChecksumLock;
use crate::manifest::{Manifest, PackageDef};
use crate::placeholder::substitute;
use crate::prefix_lock::PrefixLock;
use crate::receipt::{Receipt, ReceiptPackage};
use crate::unpack::unpack;
use crate::util::hash::Hashable;

pub use plan::{Plan, PlannedPackage, plan};
pub use resolver::PackageResolver;
pub use types::*;

/// Staging directory for one run.
enum Staging {
  /// Removed when dropped.
  Scoped(TempDir),
  /// Caller-owned; left in place.
  Persistent(PathBuf),
}

impl Staging {
  fn path(&self) -> &Path {
    match self {
      Staging::Scoped(dir) => dir.path(),
      Staging::Persistent(path) => path,
    }
  }

  /// Release the directory. Returns its path if it stays on disk.
  fn finish(self, keep: bool) -> Option<PathBuf> {
    match self {
      Staging::Scoped(dir) if keep => {
        let path = dir.keep();
        warn!(path = ?path, "keeping staging directory");
        Some(path)
      }
      Staging::Scoped(dir) => {
        let path = dir.path().to_path_buf();
        if let Err(err) = dir.close() {
          warn!(path = ?path, error = %err, "failed to remove staging directory");
        }
        None
      }
      Staging::Persistent(path) => Some(path),
    }
  }
}

/// Everything acquired by prepare and held for the rest of the run.
struct Prepared {
  prefix: PathBuf,
  staging: Staging,
  fetcher: Fetcher,
  lock: ChecksumLock,
  lock_path: PathBuf,
  _prefix_lock: PrefixLock,
}

/// Output of a single descriptor: the fetched archive and where it was built.
struct Built {
  outcome: FetchOutcome,
  tree: PathBuf,
}

fn fail(package: &PackageDef, index: usize, phase: Phase, err: impl Into<StepError>) -> ProvisionError {
  ProvisionError::Step {
    package: package.label(),
    index,
    phase,
    source: err.into(),
  }
}

fn prepare_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProvisionError + '_ {
  move |source| ProvisionError::Prepare {
    path: path.to_path_buf(),
    source,
  }
}

/// Runs one manifest against one prefix.
pub struct Provisioner<'a> {
  manifest: &'a Manifest,
  options: ProvisionOptions,
  settings: BuildSettings,
  env: Option<BuildEnv>,
  state: ProvisionState,
}

impl<'a> Provisioner<'a> {
  pub fn new(manifest: &'a Manifest, options: ProvisionOptions) -> Self {
    let settings = BuildSettings::resolve(&options, manifest);
    Self {
      manifest,
      options,
      settings,
      env: None,
      state: ProvisionState::Pending(0),
    }
  }

  /// Use `env` as the baseline instead of capturing the process environment.
  pub fn with_base_env(mut self, env: BuildEnv) -> Self {
    self.env = Some(env);
    self
  }

  pub fn state(&self) -> ProvisionState {
    self.state
  }

  /// Run the whole chain.
  ///
  /// Any error leaves the state at `Aborted`, naming the failed descriptor
  /// or, for prepare and receipt failures, the one that was pending.
  pub async fn run(&mut self) -> Result<ProvisionReport, ProvisionError> {
    let result = self.execute().await;
    if let (Err(err), ProvisionState::Pending(pending)) = (&result, self.state) {
      self.state = ProvisionState::Aborted {
        index: err.failed_index().unwrap_or(pending),
      };
    }
    result
  }

  async fn execute(&mut self) -> Result<ProvisionReport, ProvisionError> {
    let started = Instant::now();
    let mut prepared = self.prepare()?;
    let mut env = self.env.take().unwrap_or_else(BuildEnv::capture);

    let result = self.run_chain(&mut prepared, &mut env).await;

    let Prepared {
      prefix,
      staging,
      _prefix_lock,
      ..
    } = prepared;
    let staging_kept = staging.finish(self.options.keep_staging);

    let (steps, entry_point) = result?;

    let manifest_hash = self.manifest.compute_hash().map_err(ProvisionError::Hash)?;
    let receipt = Receipt::new(
      manifest_hash,
      steps
        .iter()
        .map(|s| ReceiptPackage {
          name: s.name.clone(),
          version: s.version.clone(),
          sha256: s.sha256.clone(),
        })
        .collect(),
    );
    let receipt_path = receipt.save(&prefix)?;

    self.state = ProvisionState::Done;
    info!(prefix = ?prefix, packages = steps.len(), "provisioning complete");

    Ok(ProvisionReport {
      prefix,
      steps,
      entry_point,
      receipt: receipt_path,
      staging_kept,
      duration: started.elapsed(),
    })
  }

  /// Resolve and lock the prefix, set up staging and load the checksum lock.
  fn prepare(&self) -> Result<Prepared, ProvisionError> {
    let prefix = &self.options.prefix;
    std::fs::create_dir_all(prefix).map_err(prepare_err(prefix))?;
    let prefix = dunce::canonicalize(prefix).map_err(prepare_err(prefix))?;

    let prefix_lock = PrefixLock::acquire(&prefix, &self.options.command)?;

    let staging = match &self.options.staging {
      Some(dir) => {
        std::fs::create_dir_all(dir).map_err(prepare_err(dir))?;
        Staging::Persistent(dunce::canonicalize(dir).map_err(prepare_err(dir))?)
      }
      None => {
        let dir = tempfile::Builder::new()
          .prefix("fsprov-staging-")
          .tempdir()
          .map_err(prepare_err(&std::env::temp_dir()))?;
        Staging::Scoped(dir)
      }
    };

    let download_dir = &self.options.download_dir;
    std::fs::create_dir_all(download_dir).map_err(prepare_err(download_dir))?;
    let lock_path = download_dir.join(CHECKSUM_LOCK_FILENAME);
    let lock = ChecksumLock::load_or_default(&lock_path).map_err(ProvisionError::Lock)?;

    let fetcher = Fetcher::new().map_err(ProvisionError::Client)?;

    info!(
      prefix = ?prefix,
      staging = ?staging.path(),
      downloads = ?download_dir,
      python = %self.settings.python,
      jobs = self.settings.jobs,
      "prepared"
    );

    Ok(Prepared {
      prefix,
      staging,
      fetcher,
      lock,
      lock_path,
      _prefix_lock: prefix_lock,
    })
  }

  async fn run_chain(
    &mut self,
    prepared: &mut Prepared,
    env: &mut BuildEnv,
  ) -> Result<(Vec<StepReport>, Option<PathBuf>), ProvisionError> {
    let manifest = self.manifest;
    let target_index = manifest.packages.len();
    let mut steps = Vec::with_capacity(manifest.descriptor_count());
    let mut entry_point = None;

    for (index, package) in manifest.descriptors().enumerate() {
      self.state = ProvisionState::Pending(index);
      let started = Instant::now();
      info!(package = %package.label(), index, "provisioning package");

      let built = self.build_package(index, package, prepared, env).await?;

      if index == target_index {
        let tree = install::relocate_tree(&built.tree, &prepared.prefix, &package.dir_name())
          .map_err(|e| fail(package, index, Phase::Relocate, e))?;
        if let Some(entry) = &package.entry_point {
          let link = install::install_entry_point(&tree, entry, &prepared.prefix)
            .map_err(|e| fail(package, index, Phase::Relocate, e))?;
          entry_point = Some(link);
        }
      }

      steps.push(StepReport {
        name: package.name.clone(),
        version: package.version.clone(),
        archive: built.outcome.path,
        sha256: built.outcome.sha256.0,
        cached: built.outcome.cached,
        duration: started.elapsed(),
      });
      info!(package = %package.label(), "package complete");
    }

    self.state = ProvisionState::Pending(manifest.descriptor_count());
    Ok((steps, entry_point))
  }

  /// Fetch, unpack, build and install one descriptor.
  async fn build_package(
    &self,
    index: usize,
    package: &PackageDef,
    prepared: &mut Prepared,
    env: &mut BuildEnv,
  ) -> Result<Built, ProvisionError> {
    let resolver = PackageResolver::new(package, &self.settings)
      .with_prefix(&prepared.prefix)
      .with_staging(prepared.staging.path());

    let outcome = fetch_package(
      package,
      &resolver,
      &prepared.fetcher,
      &self.options.download_dir,
      &mut prepared.lock,
      &prepared.lock_path,
    )
    .await
    .map_err(|(phase, e)| fail(package, index, phase, e))?;

    let tree = unpack(&outcome.path, prepared.staging.path(), &package.dir_name())
      .map_err(|e| fail(package, index, Phase::Unpack, e))?;
    let resolver = resolver.with_src(&tree).with_archive(&outcome.path);

    for op in &package.env {
      let op = resolve_env_op(op, &resolver).map_err(|e| fail(package, index, Phase::Build, e))?;
      env.apply(&op);
    }

    for step in &package.steps {
      let cmd = substitute(&step.cmd, &resolver).map_err(|e| fail(package, index, Phase::Build, e))?;
      let cwd = match &step.cwd {
        Some(cwd) => {
          let cwd = substitute(cwd, &resolver).map_err(|e| fail(package, index, Phase::Build, e))?;
          tree.join(cwd)
        }
        None => tree.clone(),
      };
      let mut local = std::collections::BTreeMap::new();
      for (var, value) in &step.env {
        let value = substitute(value, &resolver).map_err(|e| fail(package, index, Phase::Build, e))?;
        local.insert(var.clone(), value);
      }

      run_step(&cmd, &cwd, &env.overlay(&local), self.options.output)
        .await
        .map_err(|e| fail(package, index, Phase::Build, e))?;
    }

    for op in &package.install {
      let mut op = op.clone();
      op.from = substitute(&op.from, &resolver).map_err(|e| fail(package, index, Phase::Install, e))?;
      op.to = substitute(&op.to, &resolver).map_err(|e| fail(package, index, Phase::Install, e))?;
      install::apply(&op, &tree, &prepared.prefix).map_err(|e| fail(package, index, Phase::Install, e))?;
    }

    Ok(Built { outcome, tree })
  }
}

fn resolve_env_op(op: &EnvOp, resolver: &PackageResolver) -> Result<EnvOp, crate::placeholder::PlaceholderError> {
  match op.value() {
    Some(value) => Ok(op.with_value(substitute(value, resolver)?)),
    None => Ok(op.clone()),
  }
}

/// Environment the installed target runs in: `base` with every descriptor's
/// environment operations replayed against `prefix`.
///
/// Operations that refer to staging or to an unpacked source tree have no
/// meaning after the run and are skipped.
pub fn runtime_env(manifest: &Manifest, prefix: &Path, settings: &BuildSettings, mut base: BuildEnv) -> BuildEnv {
  for package in manifest.descriptors() {
    let resolver = PackageResolver::new(package, settings).with_prefix(prefix);
    for op in &package.env {
      match resolve_env_op(op, &resolver) {
        Ok(op) => base.apply(&op),
        Err(err) => debug!(package = %package.label(), var = %op.var(), error = %err, "skipping environment operation"),
      }
    }
  }
  base
}

/// Fetch one descriptor's archive, verifying and recording its digest.
async fn fetch_package(
  package: &PackageDef,
  resolver: &PackageResolver,
  fetcher: &Fetcher,
  download_dir: &Path,
  lock: &mut ChecksumLock,
  lock_path: &Path,
) -> Result<FetchOutcome, (Phase, StepError)> {
  let url = substitute(&package.url, resolver).map_err(|e| (Phase::Fetch, StepError::from(e)))?;
  let file = package.archive_name();
  let expected = lock.expected(&url, package.sha256.as_deref()).map(str::to_string);

  let outcome = fetcher
    .fetch(&url, download_dir, &file, expected.as_deref())
    .await
    .map_err(|e| (Phase::Fetch, StepError::from(e)))?;

  if expected.is_none() {
    warn!(
      package = %package.label(),
      sha256 = %outcome.sha256,
      "no checksum pinned, trusting first download"
    );
  }

  if lock.insert(&url, &file, outcome.sha256.as_str()) {
    lock.save(lock_path).map_err(|e| (Phase::Fetch, StepError::from(e)))?;
  }

  Ok(outcome)
}

/// Result of fetching one descriptor without building it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FetchReport {
  pub name: String,
  pub version: String,
  pub path: PathBuf,
  pub sha256: String,
  pub cached: bool,
  pub size: u64,
}

/// Fill the download cache for every descriptor, building nothing.
pub async fn fetch_all(
  manifest: &Manifest,
  options: &ProvisionOptions,
) -> Result<Vec<FetchReport>, ProvisionError> {
  let settings = BuildSettings::resolve(options, manifest);
  let download_dir = &options.download_dir;
  std::fs::create_dir_all(download_dir).map_err(prepare_err(download_dir))?;
  let lock_path = download_dir.join(CHECKSUM_LOCK_FILENAME);
  let mut lock = ChecksumLock::load_or_default(&lock_path).map_err(ProvisionError::Lock)?;
  let fetcher = Fetcher::new().map_err(ProvisionError::Client)?;

  let mut reports = Vec::with_capacity(manifest.descriptor_count());
  for (index, package) in manifest.descriptors().enumerate() {
    let resolver = PackageResolver::new(package, &settings);
    let outcome = fetch_package(package, &resolver, &fetcher, download_dir, &mut lock, &lock_path)
      .await
      .map_err(|(phase, e)| fail(package, index, phase, e))?;

    reports.push(FetchReport {
      name: package.name.clone(),
      version: package.version.clone(),
      path: outcome.path,
      sha256: outcome.sha256.0,
      cached: outcome.cached,
      size: outcome.size,
    });
  }

  Ok(reports)
}
