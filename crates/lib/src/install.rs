//! Placing build artifacts under the installation prefix.
//!
//! Most packages install themselves (`make install`, `setup.py install
//! --home`). These helpers cover the rest: manifest `install` operations,
//! relocating the target's built source tree, and exposing its entry point.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::manifest::{InstallMode, InstallOp};
use crate::platform;

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("install source does not exist: {}", .0.display())]
  MissingSource(PathBuf),

  #[error("path must stay inside its root: {0}")]
  OutsideRoot(String),

  #[error("entry point not found: {}", .0.display())]
  MissingEntryPoint(PathBuf),

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {}: {source}", path.display())]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> InstallError + '_ {
  move |source| InstallError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Join a relative manifest path onto `root`, refusing anything that escapes it.
pub fn join_inside(root: &Path, relative: &str) -> Result<PathBuf, InstallError> {
  let rel = Path::new(relative);
  let escapes = rel
    .components()
    .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
  if escapes {
    return Err(InstallError::OutsideRoot(relative.to_string()));
  }
  Ok(root.join(rel))
}

/// Apply one install operation whose paths are already substituted.
pub fn apply(op: &InstallOp, src_tree: &Path, prefix: &Path) -> Result<PathBuf, InstallError> {
  let from = join_inside(src_tree, &op.from)?;
  let to = join_inside(prefix, &op.to)?;

  if fs::symlink_metadata(&from).is_err() {
    return Err(InstallError::MissingSource(from));
  }
  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent).map_err(io_err(parent))?;
  }

  debug!(from = ?from, to = ?to, mode = ?op.mode, "install");

  match op.mode {
    InstallMode::Copy => {
      if from.is_dir() {
        copy_dir(&from, &to)?;
      } else {
        fs::copy(&from, &to).map_err(io_err(&to))?;
      }
    }
    InstallMode::Move => {
      remove_existing(&to)?;
      move_path(&from, &to)?;
    }
    InstallMode::Link => {
      remove_existing(&to)?;
      platform::link_file(&from, &to).map_err(io_err(&to))?;
    }
  }

  Ok(to)
}

/// Move the built source tree to `prefix/<dir_name>`, replacing a previous one.
pub fn relocate_tree(src_tree: &Path, prefix: &Path, dir_name: &str) -> Result<PathBuf, InstallError> {
  let dest = join_inside(prefix, dir_name)?;
  remove_existing(&dest)?;
  move_path(src_tree, &dest)?;
  info!(dest = ?dest, "relocated source tree");
  Ok(dest)
}

/// Mark `tree/entry_point` executable and link it into `prefix/bin`.
///
/// Returns the link path.
pub fn install_entry_point(tree: &Path, entry_point: &str, prefix: &Path) -> Result<PathBuf, InstallError> {
  let entry = join_inside(tree, entry_point)?;
  if !entry.is_file() {
    return Err(InstallError::MissingEntryPoint(entry));
  }
  platform::set_executable(&entry).map_err(io_err(&entry))?;

  let bin = prefix.join("bin");
  fs::create_dir_all(&bin).map_err(io_err(&bin))?;

  let file_name = entry
    .file_name()
    .ok_or_else(|| InstallError::MissingEntryPoint(entry.clone()))?;
  let link = bin.join(file_name);
  remove_existing(&link)?;
  platform::link_file(&entry, &link).map_err(io_err(&link))?;

  info!(entry = ?entry, link = ?link, "installed entry point");
  Ok(link)
}

fn remove_existing(path: &Path) -> Result<(), InstallError> {
  let Ok(meta) = fs::symlink_metadata(path) else {
    return Ok(());
  };
  if meta.is_dir() {
    fs::remove_dir_all(path).map_err(io_err(path))
  } else {
    fs::remove_file(path).map_err(io_err(path))
  }
}

/// Rename, falling back to copy-and-delete across filesystems.
fn move_path(from: &Path, to: &Path) -> Result<(), InstallError> {
  match fs::rename(from, to) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
      debug!(from = ?from, to = ?to, "cross-device move, copying");
      if from.is_dir() {
        copy_dir(from, to)?;
        fs::remove_dir_all(from).map_err(io_err(from))
      } else {
        fs::copy(from, to).map_err(io_err(to))?;
        fs::remove_file(from).map_err(io_err(from))
      }
    }
    Err(source) => Err(InstallError::Io {
      path: to.to_path_buf(),
      source,
    }),
  }
}

/// Recursively copy `from` into `to`, overwriting files in place.
fn copy_dir(from: &Path, to: &Path) -> Result<(), InstallError> {
  for entry in WalkDir::new(from) {
    let entry = entry.map_err(|source| InstallError::Walk {
      path: from.to_path_buf(),
      source,
    })?;
    let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
    let dest = to.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&dest).map_err(io_err(&dest))?;
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry.path()).map_err(io_err(entry.path()))?;
      remove_existing(&dest)?;
      platform::link_file(&target, &dest).map_err(io_err(&dest))?;
    } else {
      fs::copy(entry.path(), &dest).map_err(io_err(&dest))?;
    }
  }
  Ok(())
}
