mod check;
mod fetch;
mod init;
mod install;
mod plan;
mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fsprov_lib::manifest::Manifest;

pub use check::cmd_check;
pub use fetch::cmd_fetch;
pub use init::cmd_init;
pub use install::cmd_install;
pub use plan::cmd_plan;
pub use run::cmd_run;

/// Load `path`, or the built-in manifest when none is given.
fn load_manifest(path: Option<&Path>) -> Result<Manifest> {
  Manifest::load_or_builtin(path).context("Failed to load manifest")
}

fn or_default(path: Option<PathBuf>, default: fn() -> PathBuf) -> PathBuf {
  path.unwrap_or_else(default)
}
