//! Side-effect free preview of a provisioning run.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::consts::CHECKSUM_LOCK_FILENAME;
use crate::env::EnvOp;
use crate::lock::ChecksumLock;
use crate::manifest::Manifest;
use crate::placeholder::{PlaceholderError, substitute};

use super::resolver::PackageResolver;
use super::types::{BuildSettings, ProvisionOptions};

/// Shown in place of the staging path when it is a scoped temporary directory.
const SCOPED_STAGING: &str = "<staging>";

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
  pub prefix: PathBuf,
  pub download_dir: PathBuf,
  pub settings: BuildSettings,
  pub packages: Vec<PlannedPackage>,
}

impl Plan {
  /// Number of archives that would be downloaded.
  pub fn download_count(&self) -> usize {
    self.packages.iter().filter(|p| !p.cached).count()
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedPackage {
  pub name: String,
  pub version: String,
  pub url: String,
  pub archive: String,
  /// The archive is already in the download cache.
  pub cached: bool,
  /// Digest the download will be checked against, if any.
  pub sha256: Option<String>,
  pub env: Vec<EnvOp>,
  pub commands: Vec<String>,
  pub target: bool,
}

/// Resolve every descriptor's URL, environment edits and commands.
///
/// Reads the download cache and checksum lock but writes nothing.
pub fn plan(manifest: &Manifest, options: &ProvisionOptions) -> Result<Plan, PlaceholderError> {
  let settings = BuildSettings::resolve(options, manifest);
  let prefix = std::path::absolute(&options.prefix).unwrap_or_else(|_| options.prefix.clone());
  let staging = options
    .staging
    .clone()
    .unwrap_or_else(|| PathBuf::from(SCOPED_STAGING));
  let lock = ChecksumLock::load(&options.download_dir.join(CHECKSUM_LOCK_FILENAME))
    .ok()
    .flatten()
    .unwrap_or_default();
  let target_index = manifest.packages.len();

  let mut packages = Vec::with_capacity(manifest.descriptor_count());
  for (index, package) in manifest.descriptors().enumerate() {
    let archive = package.archive_name();
    let src = staging.join(package.dir_name());
    let archive_path = options.download_dir.join(&archive);
    let resolver = PackageResolver::new(package, &settings)
      .with_prefix(&prefix)
      .with_staging(&staging)
      .with_src(&src)
      .with_archive(&archive_path);

    let url = substitute(&package.url, &resolver)?;

    let mut env = Vec::with_capacity(package.env.len());
    for op in &package.env {
      env.push(match op.value() {
        Some(value) => op.with_value(substitute(value, &resolver)?),
        None => op.clone(),
      });
    }

    let mut commands = Vec::with_capacity(package.steps.len());
    for step in &package.steps {
      let cmd = substitute(&step.cmd, &resolver)?;
      commands.push(match &step.cwd {
        Some(cwd) => format!("(cd {}) {}", substitute(cwd, &resolver)?, cmd),
        None => cmd,
      });
    }

    packages.push(PlannedPackage {
      name: package.name.clone(),
      version: package.version.clone(),
      sha256: lock.expected(&url, package.sha256.as_deref()).map(str::to_string),
      cached: is_cached(&archive_path),
      url,
      archive,
      env,
      commands,
      target: index == target_index,
    });
  }

  Ok(Plan {
    prefix,
    download_dir: options.download_dir.clone(),
    settings,
    packages,
  })
}

fn is_cached(path: &Path) -> bool {
  path.is_file()
}
