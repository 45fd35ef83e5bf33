use crate::consts::{APP_NAME, ENV_DOWNLOAD_DIR, ENV_PREFIX};
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("/"))
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Roaming"))
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Local"))
    .join(APP_NAME)
    .join("Cache")
}

/// Returns the directory for cache files for the application
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Default installation prefix.
///
/// `FSPROV_PREFIX` wins over the data directory.
pub fn default_prefix() -> PathBuf {
  match std::env::var(ENV_PREFIX) {
    Ok(prefix) if !prefix.is_empty() => PathBuf::from(prefix),
    _ => data_dir(),
  }
}

/// Default download cache.
///
/// `FSPROV_DOWNLOAD_DIR` wins over `<cache>/downloads`.
pub fn default_download_dir() -> PathBuf {
  match std::env::var(ENV_DOWNLOAD_DIR) {
    Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => cache_dir().join("downloads"),
  }
}
