//! Platform-specific paths and file mode helpers.

pub mod paths;

use std::io;
use std::path::Path;

/// Mark a file executable by its owner, group and others.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;

  let mut perms = std::fs::metadata(path)?.permissions();
  perms.set_mode(perms.mode() | 0o111);
  std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
pub fn set_executable(path: &Path) -> io::Result<()> {
  std::fs::metadata(path).map(|_| ())
}

/// Whether `path` is a regular file the current user could execute.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;

  std::fs::metadata(path)
    .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
  path.is_file()
}

/// Create a link at `link` pointing to `target`.
///
/// Symlinks on Unix; a plain copy elsewhere.
#[cfg(unix)]
pub fn link_file(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
pub fn link_file(target: &Path, link: &Path) -> io::Result<()> {
  std::fs::copy(target, link).map(|_| ())
}
