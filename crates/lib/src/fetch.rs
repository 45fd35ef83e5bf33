//! Archive download into the persistent download cache.
//!
//! Downloads stream into `<file>.part` and are renamed into place only after
//! the body was fully received and its digest checked. A file under its final
//! name is therefore always a completed download.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::consts::{APP_NAME, PARTIAL_SUFFIX};
use crate::util::hash::{ContentHash, hash_bytes, hash_file};
use crate::util::is_plain_name;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("failed to create HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("failed to download {url}: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("failed to download {url}: HTTP {status}")]
  Status { url: String, status: u16 },

  #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("download file name must be a single path component: '{0}'")]
  InvalidFileName(String),

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> FetchError + '_ {
  move |source| FetchError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Result of a single fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
  pub path: PathBuf,
  pub sha256: ContentHash,
  /// True when the file was already present and no request was made.
  pub cached: bool,
  pub size: u64,
}

/// HTTP downloader shared across a provisioning run.
#[derive(Debug, Clone)]
pub struct Fetcher {
  client: reqwest::Client,
}

impl Fetcher {
  pub fn new() -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .user_agent(format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(FetchError::Client)?;
    Ok(Self { client })
  }

  /// Fetch `url` into `dest_dir/file_name`.
  ///
  /// If the destination already exists and either matches `expected_sha256`
  /// or no digest is known, it is reused without a request. A cached file
  /// that disagrees with `expected_sha256` is downloaded again. A fresh
  /// download that disagrees is an error and leaves nothing behind.
  pub async fn fetch(
    &self,
    url: &str,
    dest_dir: &Path,
    file_name: &str,
    expected_sha256: Option<&str>,
  ) -> Result<FetchOutcome, FetchError> {
    if !is_plain_name(file_name) {
      return Err(FetchError::InvalidFileName(file_name.to_string()));
    }
    fs::create_dir_all(dest_dir).await.map_err(io_err(dest_dir))?;
    let dest_path = dest_dir.join(file_name);

    if dest_path.exists() {
      debug!(path = ?dest_path, "checking cached file");
      let actual = hash_file(&dest_path).map_err(io_err(&dest_path))?;
      match expected_sha256 {
        Some(expected) if !actual.matches(expected) => {
          debug!(expected = %expected, actual = %actual, "cached file hash mismatch, re-downloading");
        }
        _ => {
          let size = std::fs::metadata(&dest_path).map_err(io_err(&dest_path))?.len();
          info!(path = ?dest_path, "using cached file");
          return Ok(FetchOutcome {
            path: dest_path,
            sha256: actual,
            cached: true,
            size,
          });
        }
      }
    }

    info!(url = %url, "fetching URL");

    let mut response = self.client.get(url).send().await.map_err(|source| FetchError::Request {
      url: url.to_string(),
      source,
    })?;

    if !response.status().is_success() {
      return Err(FetchError::Status {
        url: url.to_string(),
        status: response.status().as_u16(),
      });
    }

    let part_path = dest_dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));
    let mut file = fs::File::create(&part_path).await.map_err(io_err(&part_path))?;
    let mut hasher = Sha256::new();
    let mut size = 0u64;

    loop {
      let chunk = match response.chunk().await {
        Ok(Some(chunk)) => chunk,
        Ok(None) => break,
        Err(source) => {
          drop(file);
          let _ = fs::remove_file(&part_path).await;
          return Err(FetchError::Request {
            url: url.to_string(),
            source,
          });
        }
      };
      hasher.update(&chunk);
      size += chunk.len() as u64;
      if let Err(source) = file.write_all(&chunk).await {
        drop(file);
        let _ = fs::remove_file(&part_path).await;
        return Err(io_err(&part_path)(source));
      }
    }
    let flushed = file.flush().await;
    drop(file);
    if let Err(source) = flushed {
      let _ = fs::remove_file(&part_path).await;
      return Err(io_err(&part_path)(source));
    }

    let actual = ContentHash(hex::encode(hasher.finalize()));

    if let Some(expected) = expected_sha256
      && !actual.matches(expected)
    {
      let _ = fs::remove_file(&part_path).await;
      return Err(FetchError::HashMismatch {
        url: url.to_string(),
        expected: expected.to_string(),
        actual: actual.0,
      });
    }

    fs::rename(&part_path, &dest_path).await.map_err(io_err(&dest_path))?;

    info!(path = ?dest_path, size, "download complete");

    Ok(FetchOutcome {
      path: dest_path,
      sha256: actual,
      cached: false,
      size,
    })
  }
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to a hash of
/// the URL if no suitable filename can be extracted.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split('?').next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  format!("download_{}", &hash_bytes(url.as_bytes()).0[..16])
}
