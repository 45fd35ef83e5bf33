//! Implementation of the `fsprov fetch` command.
//!
//! Fills the download cache so a later install can run offline.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};

use fsprov_lib::platform::paths;
use fsprov_lib::provision::{ProvisionOptions, fetch_all};

use super::{load_manifest, or_default};
use crate::output::{format_bytes, format_duration, print_stat, print_success, symbols, truncate_hash};

pub fn cmd_fetch(manifest: Option<&Path>, download_dir: Option<PathBuf>) -> Result<()> {
  let start = Instant::now();
  let manifest = load_manifest(manifest)?;
  let options = ProvisionOptions {
    download_dir: or_default(download_dir, paths::default_download_dir),
    ..ProvisionOptions::default()
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let reports = rt.block_on(fetch_all(&manifest, &options)).context("Fetch failed")?;

  for report in &reports {
    let source = if report.cached { "cached" } else { "downloaded" };
    println!(
      "  {} {}-{} {} ({}, sha256 {})",
      symbols::SUCCESS,
      report.name,
      report.version,
      source,
      format_bytes(report.size),
      truncate_hash(&report.sha256)
    );
  }

  let downloaded = reports.iter().filter(|r| !r.cached).count();
  println!();
  print_success("Fetch complete!");
  print_stat("Archives downloaded", &downloaded.to_string());
  print_stat("Archives cached", &(reports.len() - downloaded).to_string());
  print_stat("Cache", &options.download_dir.display().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
