//! Implementation of the `fsprov check` command.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use owo_colors::{OwoColorize, Stream};

use fsprov_lib::check::check_installation;
use fsprov_lib::platform::paths;
use fsprov_lib::receipt::Receipt;

use super::{load_manifest, or_default};
use crate::output::{OutputFormat, format_timestamp, print_json, print_stat, print_success, symbols};

pub fn cmd_check(manifest: Option<&Path>, prefix: Option<PathBuf>, output: OutputFormat) -> Result<()> {
  let manifest = load_manifest(manifest)?;
  let prefix = or_default(prefix, paths::default_prefix);

  let report = check_installation(&prefix, &manifest);

  if output.is_json() {
    print_json(&report)?;
  } else {
    for item in &report.items {
      let symbol = if item.ok {
        symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string()
      } else {
        symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string()
      };
      println!("  {} {:<8} {}", symbol, item.name, item.detail);
    }
  }

  let failed = report.failures().count();
  if failed > 0 {
    bail!("{failed} check(s) failed for {}", report.prefix.display());
  }

  if !output.is_json() {
    println!();
    print_success("Installation is complete");
    if let Ok(Some(receipt)) = Receipt::load(&report.prefix) {
      print_stat("Installed", &format_timestamp(receipt.completed_at));
    }
  }

  Ok(())
}
