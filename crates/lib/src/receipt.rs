//! Install receipt written into the prefix after a successful run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::RECEIPT_FILENAME;
use crate::util::hash::ObjectHash;

pub const RECEIPT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
  pub version: u32,
  /// Hash of the manifest the installation was built from.
  pub manifest_hash: ObjectHash,
  pub packages: Vec<ReceiptPackage>,
  /// Unix timestamp of completion.
  pub completed_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPackage {
  pub name: String,
  pub version: String,
  pub sha256: String,
}

#[derive(Debug, Error)]
pub enum ReceiptError {
  #[error("failed to read receipt {}: {source}", path.display())]
  Read { path: PathBuf, source: io::Error },

  #[error("failed to write receipt {}: {source}", path.display())]
  Write { path: PathBuf, source: io::Error },

  #[error("failed to parse receipt: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize receipt: {0}")]
  Serialize(#[source] serde_json::Error),
}

impl Receipt {
  pub fn new(manifest_hash: ObjectHash, packages: Vec<ReceiptPackage>) -> Self {
    Self {
      version: RECEIPT_VERSION,
      manifest_hash,
      packages,
      completed_at: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    }
  }

  pub fn path(prefix: &Path) -> PathBuf {
    prefix.join(RECEIPT_FILENAME)
  }

  /// Load the receipt from `prefix`, `Ok(None)` if there is none.
  pub fn load(prefix: &Path) -> Result<Option<Self>, ReceiptError> {
    let path = Self::path(prefix);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(ReceiptError::Read { path, source }),
    };
    serde_json::from_str(&content).map(Some).map_err(ReceiptError::Parse)
  }

  pub fn save(&self, prefix: &Path) -> Result<PathBuf, ReceiptError> {
    let path = Self::path(prefix);
    let content = serde_json::to_string_pretty(self).map_err(ReceiptError::Serialize)?;
    fs::write(&path, content + "\n").map_err(|source| ReceiptError::Write {
      path: path.clone(),
      source,
    })?;
    Ok(path)
  }
}
