//! Manifest types for fsprov.
//!
//! The manifest is the declarative form of the provisioning chain. It lists
//! the dependency packages in build order followed by one target package.
//!
//! # Example
//!
//! ```toml
//! version = 1
//!
//! [settings]
//! python = "python2"
//!
//! [[package]]
//! name = "gsl"
//! version = "2.1"
//! url = "https://ftp.gnu.org/gnu/gsl/gsl-2.1.tar.gz"
//! env = [{ op = "restore", var = "LDFLAGS" }]
//! steps = [
//!   { cmd = "./configure --prefix=$${prefix}" },
//!   { cmd = "make install" },
//! ]
//!
//! [target]
//! name = "fastStructure"
//! version = "1.0"
//! url = "https://github.com/rajanil/fastStructure/archive/v1.0.tar.gz"
//! archive = "fastStructure-1.0.tar.gz"
//! entry_point = "structure.py"
//! steps = [{ cmd = "$${python} setup.py build_ext --inplace" }]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::env::EnvOp;
use crate::fetch::url_to_filename;
use crate::util::hash::Hashable;

/// The complete provisioning manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  /// Manifest format version.
  pub version: u32,
  #[serde(default)]
  pub settings: Settings,
  /// Dependencies, built in order.
  #[serde(default, rename = "package")]
  pub packages: Vec<PackageDef>,
  /// The application built once every dependency is installed.
  pub target: PackageDef,
}

impl Hashable for Manifest {}

impl Manifest {
  /// Dependencies followed by the target, in build order.
  pub fn descriptors(&self) -> impl Iterator<Item = &PackageDef> {
    self.packages.iter().chain(std::iter::once(&self.target))
  }

  /// Number of descriptors, target included.
  pub fn descriptor_count(&self) -> usize {
    self.packages.len() + 1
  }

  /// Descriptor at build position `index`; the target comes last.
  pub fn descriptor(&self, index: usize) -> Option<&PackageDef> {
    match index.cmp(&self.packages.len()) {
      std::cmp::Ordering::Less => self.packages.get(index),
      std::cmp::Ordering::Equal => Some(&self.target),
      std::cmp::Ordering::Greater => None,
    }
  }
}

/// Defaults the CLI may override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
  /// Interpreter substituted for `$${python}`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub python: Option<String>,
  /// Parallelism substituted for `$${jobs}`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub jobs: Option<usize>,
}

/// A single package: where to get it and how to build it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDef {
  pub name: String,
  pub version: String,
  pub url: String,
  /// Pinned SHA-256 of the archive (lowercase hex).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sha256: Option<String>,
  /// File name in the download cache. Defaults to the last URL segment.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub archive: Option<String>,
  /// Directory the archive unpacks to. Defaults to `{name}-{version}`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dir: Option<String>,
  /// Sticky environment edits applied before the steps run.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub env: Vec<EnvOp>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub steps: Vec<StepDef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub install: Vec<InstallOp>,
  /// Application entry point relative to the source tree. Target only.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entry_point: Option<String>,
}

impl PackageDef {
  pub fn archive_name(&self) -> String {
    self.archive.clone().unwrap_or_else(|| url_to_filename(&self.url))
  }

  pub fn dir_name(&self) -> String {
    self
      .dir
      .clone()
      .unwrap_or_else(|| format!("{}-{}", self.name, self.version))
  }

  /// `name-version`, used in logs and reports.
  pub fn label(&self) -> String {
    format!("{}-{}", self.name, self.version)
  }
}

/// One build command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDef {
  /// Shell command line.
  pub cmd: String,
  /// Working directory relative to the source tree.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cwd: Option<String>,
  /// Variables for this step only.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
}

impl StepDef {
  pub fn new(cmd: &str) -> Self {
    Self {
      cmd: cmd.to_string(),
      cwd: None,
      env: BTreeMap::new(),
    }
  }

  pub fn with_cwd(mut self, cwd: &str) -> Self {
    self.cwd = Some(cwd.to_string());
    self
  }

  pub fn with_env(mut self, var: &str, value: &str) -> Self {
    self.env.insert(var.to_string(), value.to_string());
    self
  }
}

impl From<&str> for StepDef {
  fn from(cmd: &str) -> Self {
    StepDef::new(cmd)
  }
}

/// How an install operation places its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
  #[default]
  Copy,
  Move,
  Link,
}

/// Place a build artifact under the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOp {
  /// Path relative to the source tree.
  pub from: String,
  /// Path relative to the prefix.
  pub to: String,
  #[serde(default)]
  pub mode: InstallMode,
}
