//! Implementation of the `fsprov init` command.
//!
//! Writes the built-in manifest out so it can be edited and passed back with
//! `--manifest`.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use fsprov_lib::manifest::BUILTIN_MANIFEST;

use crate::output::symbols;

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if `path` already exists or cannot be written.
pub fn cmd_init(path: &Path) -> Result<()> {
  let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
    Ok(file) => file,
    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
      bail!("{} already exists, refusing to overwrite", path.display())
    }
    Err(e) => return Err(e).with_context(|| format!("Failed to create {}", path.display())),
  };
  file
    .write_all(BUILTIN_MANIFEST.as_bytes())
    .with_context(|| format!("Failed to write {}", path.display()))?;

  println!(
    "{} {}",
    symbols::SUCCESS.green(),
    format!("Wrote manifest to {}", path.display()).green().bold()
  );
  println!();
  println!("{}", "Next steps:".bold());
  println!("  1. Edit {} to pin versions or checksums", path.display().to_string().cyan());
  println!(
    "  2. Run: {}",
    format!("fsprov install --manifest {}", path.display()).cyan()
  );

  Ok(())
}
