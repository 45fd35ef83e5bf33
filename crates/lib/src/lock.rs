//! Checksum lock for downloaded archives.
//!
//! The lock (`checksums.lock`) lives in the download cache and records the
//! SHA-256 of every archive the first time it is fetched. Later fetches verify
//! against the recorded digest, so a silently changed upstream tarball is
//! noticed instead of built.
//!
//! # Lock File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "https://ftp.gnu.org/gnu/gsl/gsl-2.1.tar.gz": {
//!       "sha256": "<64 lowercase hex characters>",
//!       "file": "gsl-2.1.tar.gz",
//!       "fetchedAt": 1733667300
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current lock file format version.
pub const LOCK_VERSION: u32 = 1;

/// Recorded archive digests, keyed by URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksumLock {
  pub version: u32,
  pub entries: BTreeMap<String, LockedArchive>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedArchive {
  /// Lowercase hex SHA-256 of the archive.
  pub sha256: String,
  /// File name in the download cache.
  pub file: String,
  /// Unix timestamp of the download that produced this entry.
  pub fetched_at: u64,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to read lock file: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write lock file: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse lock file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize lock file: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported lock file version {0}, expected {LOCK_VERSION}")]
  UnsupportedVersion(u32),
}

impl Default for ChecksumLock {
  fn default() -> Self {
    Self::new()
  }
}

impl ChecksumLock {
  pub fn new() -> Self {
    Self {
      version: LOCK_VERSION,
      entries: BTreeMap::new(),
    }
  }

  /// Load a lock file, returning `Ok(None)` if it does not exist.
  pub fn load(path: &Path) -> Result<Option<Self>, LockError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(LockError::Read(e)),
    };

    let lock: ChecksumLock = serde_json::from_str(&content).map_err(LockError::Parse)?;

    if lock.version != LOCK_VERSION {
      return Err(LockError::UnsupportedVersion(lock.version));
    }

    Ok(Some(lock))
  }

  /// Load a lock file or start an empty one.
  pub fn load_or_default(path: &Path) -> Result<Self, LockError> {
    Ok(Self::load(path)?.unwrap_or_default())
  }

  /// Write the lock file, creating parent directories as needed.
  pub fn save(&self, path: &Path) -> Result<(), LockError> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(LockError::Write)?;
    }

    let content = serde_json::to_string_pretty(self).map_err(LockError::Serialize)?;
    fs::write(path, content + "\n").map_err(LockError::Write)
  }

  pub fn get(&self, url: &str) -> Option<&LockedArchive> {
    self.entries.get(url)
  }

  /// Record a digest for `url`. Returns true if the lock changed.
  pub fn insert(&mut self, url: &str, file: &str, sha256: &str) -> bool {
    if let Some(existing) = self.entries.get(url)
      && existing.sha256 == sha256
      && existing.file == file
    {
      return false;
    }

    let fetched_at = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();

    self.entries.insert(
      url.to_string(),
      LockedArchive {
        sha256: sha256.to_string(),
        file: file.to_string(),
        fetched_at,
      },
    );
    true
  }

  /// The digest a fetch must match: the manifest pin wins over the lock.
  pub fn expected<'a>(&'a self, url: &str, pinned: Option<&'a str>) -> Option<&'a str> {
    pinned.or_else(|| self.get(url).map(|entry| entry.sha256.as_str()))
  }
}
