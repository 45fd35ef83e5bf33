//! Placeholder resolution during a provisioning run.

use std::path::Path;

use crate::manifest::PackageDef;
use crate::placeholder::{Placeholder, PlaceholderError, Resolver};

use super::types::BuildSettings;

/// Resolves placeholders for one descriptor.
///
/// Run-wide values (prefix, staging, interpreter, jobs) are fixed at
/// construction. `src` and `archive` only resolve once the descriptor's
/// archive has been fetched and unpacked.
#[derive(Debug, Clone)]
pub struct PackageResolver {
  prefix: Option<String>,
  staging: Option<String>,
  python: String,
  jobs: String,
  name: String,
  version: String,
  src: Option<String>,
  archive: Option<String>,
}

fn path_str(path: &Path) -> String {
  path.to_string_lossy().to_string()
}

impl PackageResolver {
  pub fn new(package: &PackageDef, settings: &BuildSettings) -> Self {
    Self {
      prefix: None,
      staging: None,
      python: settings.python.clone(),
      jobs: settings.jobs.to_string(),
      name: package.name.clone(),
      version: package.version.clone(),
      src: None,
      archive: None,
    }
  }

  pub fn with_prefix(mut self, prefix: &Path) -> Self {
    self.prefix = Some(path_str(prefix));
    self
  }

  pub fn with_staging(mut self, staging: &Path) -> Self {
    self.staging = Some(path_str(staging));
    self
  }

  pub fn with_src(mut self, src: &Path) -> Self {
    self.src = Some(path_str(src));
    self
  }

  pub fn with_archive(mut self, archive: &Path) -> Self {
    self.archive = Some(path_str(archive));
    self
  }
}

impl Resolver for PackageResolver {
  fn resolve(&self, placeholder: Placeholder) -> Result<&str, PlaceholderError> {
    let value = match placeholder {
      Placeholder::Prefix => self.prefix.as_deref(),
      Placeholder::Staging => self.staging.as_deref(),
      Placeholder::Src => self.src.as_deref(),
      Placeholder::Archive => self.archive.as_deref(),
      Placeholder::Name => Some(self.name.as_str()),
      Placeholder::Version => Some(self.version.as_str()),
      Placeholder::Python => Some(self.python.as_str()),
      Placeholder::Jobs => Some(self.jobs.as_str()),
    };
    value.ok_or(PlaceholderError::Unresolved(placeholder))
  }
}
