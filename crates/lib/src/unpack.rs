//! Archive extraction into the staging directory.
//!
//! Source archives keep their top-level directory (`gsl-2.1/`, `numpy-1.10.4/`),
//! so each package lands in its own tree under the staging root.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};

use crate::util::is_plain_name;

#[derive(Debug, Error)]
pub enum UnpackError {
  #[error("unsupported archive format: {0}")]
  Unsupported(String),

  #[error("corrupt archive {}: {message}", path.display())]
  Corrupt { path: PathBuf, message: String },

  #[error("archive {} contains an entry outside the destination: {entry}", path.display())]
  UnsafePath { path: PathBuf, entry: String },

  #[error("source directory must be a single path component: '{0}'")]
  InvalidDir(String),

  #[error("archive {} did not produce the expected directory '{dir}'", path.display())]
  MissingDir { path: PathBuf, dir: String },

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Archive formats recognized by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
  TarGz,
  Tar,
  Zip,
}

impl ArchiveFormat {
  pub fn from_path(path: &Path) -> Option<Self> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Some(ArchiveFormat::TarGz)
    } else if name.ends_with(".tar") {
      Some(ArchiveFormat::Tar)
    } else if name.ends_with(".zip") {
      Some(ArchiveFormat::Zip)
    } else {
      None
    }
  }
}

/// Extract `archive` under `dest` and return `dest/expected_dir`.
///
/// A tree already at `dest/expected_dir` is removed first so a rerun never
/// builds on top of a previous partial extraction.
pub fn unpack(archive: &Path, dest: &Path, expected_dir: &str) -> Result<PathBuf, UnpackError> {
  let format =
    ArchiveFormat::from_path(archive).ok_or_else(|| UnpackError::Unsupported(archive.display().to_string()))?;

  if !is_plain_name(expected_dir) {
    return Err(UnpackError::InvalidDir(expected_dir.to_string()));
  }

  let tree = dest.join(expected_dir);
  if tree.exists() {
    debug!(path = ?tree, "removing stale source tree");
    fs::remove_dir_all(&tree).map_err(|source| UnpackError::Io {
      path: tree.clone(),
      source,
    })?;
  }
  fs::create_dir_all(dest).map_err(|source| UnpackError::Io {
    path: dest.to_path_buf(),
    source,
  })?;

  info!(archive = ?archive, dest = ?dest, "unpacking");

  match format {
    ArchiveFormat::TarGz => {
      let file = open(archive)?;
      unpack_tar(Archive::new(GzDecoder::new(BufReader::new(file))), archive, dest)?;
    }
    ArchiveFormat::Tar => {
      let file = open(archive)?;
      unpack_tar(Archive::new(BufReader::new(file)), archive, dest)?;
    }
    ArchiveFormat::Zip => unpack_zip(archive, dest)?,
  }

  if !tree.is_dir() {
    return Err(UnpackError::MissingDir {
      path: archive.to_path_buf(),
      dir: expected_dir.to_string(),
    });
  }

  Ok(tree)
}

fn open(archive: &Path) -> Result<File, UnpackError> {
  File::open(archive).map_err(|source| UnpackError::Io {
    path: archive.to_path_buf(),
    source,
  })
}

fn corrupt(archive: &Path, err: impl std::fmt::Display) -> UnpackError {
  UnpackError::Corrupt {
    path: archive.to_path_buf(),
    message: err.to_string(),
  }
}

fn unpack_tar<R: std::io::Read>(mut tar: Archive<R>, archive: &Path, dest: &Path) -> Result<(), UnpackError> {
  tar.set_preserve_permissions(true);

  for entry in tar.entries().map_err(|e| corrupt(archive, e))? {
    let mut entry = entry.map_err(|e| corrupt(archive, e))?;
    let name = entry.path().map_err(|e| corrupt(archive, e))?.display().to_string();

    // unpack_in refuses entries that would land outside `dest`
    let unpacked = entry.unpack_in(dest).map_err(|e| corrupt(archive, e))?;
    if !unpacked {
      return Err(UnpackError::UnsafePath {
        path: archive.to_path_buf(),
        entry: name,
      });
    }
  }

  Ok(())
}

fn unpack_zip(archive: &Path, dest: &Path) -> Result<(), UnpackError> {
  let file = open(archive)?;
  let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(archive, e))?;

  for i in 0..zip.len() {
    let mut file = zip.by_index(i).map_err(|e| corrupt(archive, e))?;

    let path = file.enclosed_name().ok_or_else(|| UnpackError::UnsafePath {
      path: archive.to_path_buf(),
      entry: file.name().to_string(),
    })?;
    let dest_path = dest.join(path);
    let io = |source| UnpackError::Io {
      path: dest_path.clone(),
      source,
    };

    if file.is_dir() {
      fs::create_dir_all(&dest_path).map_err(io)?;
      continue;
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent).map_err(io)?;
    }
    let mut outfile = File::create(&dest_path).map_err(io)?;
    std::io::copy(&mut file, &mut outfile).map_err(|e| corrupt(archive, e))?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = file.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode)).map_err(io)?;
      }
    }
  }

  Ok(())
}
