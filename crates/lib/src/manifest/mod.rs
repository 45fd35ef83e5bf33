//! Provisioning manifest: loading, the built-in chain, and validation.

mod types;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::MANIFEST_VERSION;
use crate::placeholder::{self, PlaceholderError};
use crate::util::is_plain_name;

pub use types::*;

/// The fastStructure 1.0 chain shipped with fsprov.
pub const BUILTIN_MANIFEST: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/manifests/faststructure.toml"));

/// Errors that can occur when loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("failed to parse manifest: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("unsupported manifest version {0}, expected {MANIFEST_VERSION}")]
  UnsupportedVersion(u32),

  #[error("invalid package '{package}': {message}")]
  InvalidPackage { package: String, message: String },

  #[error("invalid template in package '{package}' ({field}): {source}")]
  Template {
    package: String,
    field: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("duplicate package name: {0}")]
  DuplicateName(String),
}

impl Manifest {
  /// Parse and validate a manifest from TOML text.
  pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
    let manifest: Manifest = toml::from_str(content)?;
    manifest.validate()?;
    Ok(manifest)
  }

  /// Load and validate a manifest file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml(&content)
  }

  /// The built-in fastStructure manifest.
  pub fn builtin() -> Result<Self, ManifestError> {
    Self::from_toml(BUILTIN_MANIFEST)
  }

  /// Load `path` if given, else the built-in manifest.
  pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, ManifestError> {
    match path {
      Some(path) => Self::load(path),
      None => Self::builtin(),
    }
  }

  /// Check structural rules the TOML schema cannot express.
  pub fn validate(&self) -> Result<(), ManifestError> {
    if self.version != MANIFEST_VERSION {
      return Err(ManifestError::UnsupportedVersion(self.version));
    }

    let mut seen = HashSet::new();
    for package in self.descriptors() {
      if !seen.insert(package.name.as_str()) {
        return Err(ManifestError::DuplicateName(package.name.clone()));
      }
      validate_package(package)?;
    }

    for package in &self.packages {
      if package.entry_point.is_some() {
        return Err(invalid(package, "entry_point is only allowed on the target"));
      }
    }

    if self.target.steps.is_empty() {
      return Err(invalid(&self.target, "the target needs at least one build step"));
    }
    if let Some(entry) = &self.target.entry_point
      && Path::new(entry).is_absolute()
    {
      return Err(invalid(&self.target, "entry_point must be relative to the source tree"));
    }

    Ok(())
  }
}

fn invalid(package: &PackageDef, message: &str) -> ManifestError {
  ManifestError::InvalidPackage {
    package: package.name.clone(),
    message: message.to_string(),
  }
}

fn check_template(package: &PackageDef, field: &str, value: &str) -> Result<(), ManifestError> {
  placeholder::validate(value).map_err(|source| ManifestError::Template {
    package: package.name.clone(),
    field: field.to_string(),
    source,
  })
}

fn validate_package(package: &PackageDef) -> Result<(), ManifestError> {
  if package.name.trim().is_empty() {
    return Err(invalid(package, "name is empty"));
  }
  if package.version.trim().is_empty() {
    return Err(invalid(package, "version is empty"));
  }
  if package.url.trim().is_empty() {
    return Err(invalid(package, "url is empty"));
  }
  if let Some(sha256) = &package.sha256
    && !is_sha256_hex(sha256)
  {
    return Err(invalid(package, "sha256 must be 64 lowercase hex characters"));
  }

  check_template(package, "url", &package.url)?;

  if !is_plain_name(&package.dir_name()) {
    return Err(invalid(package, "dir (or name-version) must be a single path component"));
  }
  if !is_plain_name(&package.archive_name()) {
    return Err(invalid(package, "archive must be a single file name"));
  }

  for (i, op) in package.env.iter().enumerate() {
    if op.var().trim().is_empty() {
      return Err(invalid(package, &format!("env[{i}] has an empty variable name")));
    }
    if let Some(value) = op.value() {
      check_template(package, &format!("env[{i}]"), value)?;
    }
  }

  for (i, step) in package.steps.iter().enumerate() {
    if step.cmd.trim().is_empty() {
      return Err(invalid(package, &format!("steps[{i}] has an empty cmd")));
    }
    check_template(package, &format!("steps[{i}].cmd"), &step.cmd)?;
    if let Some(cwd) = &step.cwd {
      check_template(package, &format!("steps[{i}].cwd"), cwd)?;
    }
    for (var, value) in &step.env {
      check_template(package, &format!("steps[{i}].env.{var}"), value)?;
    }
  }

  for (i, op) in package.install.iter().enumerate() {
    check_template(package, &format!("install[{i}].from"), &op.from)?;
    check_template(package, &format!("install[{i}].to"), &op.to)?;
  }

  Ok(())
}

fn is_sha256_hex(value: &str) -> bool {
  value.len() == 64 && value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
