//! Implementation of the `fsprov install` command.
//!
//! Runs the whole chain against the prefix: every dependency in manifest
//! order, then the target. Stops at the first failure.

use anyhow::{Context, Result};

use fsprov_lib::execute::OutputMode;
use fsprov_lib::platform::paths;
use fsprov_lib::provision::{ProvisionOptions, Provisioner};

use super::{load_manifest, or_default};
use crate::InstallArgs;
use crate::output::{format_duration, print_info, print_stat, print_success, print_warning, symbols, truncate_hash};

pub fn cmd_install(args: InstallArgs) -> Result<()> {
  let manifest = load_manifest(args.manifest.manifest.as_deref())?;

  let options = ProvisionOptions {
    prefix: or_default(args.prefix, paths::default_prefix),
    staging: args.staging,
    keep_staging: args.keep_staging,
    download_dir: or_default(args.download_dir, paths::default_download_dir),
    python: args.python,
    jobs: args.jobs,
    output: if args.quiet_builds {
      OutputMode::Capture
    } else {
      OutputMode::Inherit
    },
    command: std::env::args().collect::<Vec<_>>().join(" "),
  };

  print_info(&format!(
    "Installing {} into {}",
    manifest.target.label(),
    options.prefix.display()
  ));

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let mut provisioner = Provisioner::new(&manifest, options);
  let report = rt.block_on(provisioner.run()).context("Install failed")?;

  println!();
  for step in &report.steps {
    let source = if step.cached { "cached" } else { "downloaded" };
    println!(
      "  {} {}-{} ({}, sha256 {}, {})",
      symbols::SUCCESS,
      step.name,
      step.version,
      source,
      truncate_hash(&step.sha256),
      format_duration(step.duration)
    );
  }
  println!();

  print_success("Install complete!");
  print_stat("Prefix", &report.prefix.display().to_string());
  if let Some(entry) = &report.entry_point {
    print_stat("Entry point", &entry.display().to_string());
  }
  print_stat("Receipt", &report.receipt.display().to_string());
  print_stat("Duration", &format_duration(report.duration));

  if let Some(staging) = &report.staging_kept {
    print_warning(&format!("Staging directory left at {}", staging.display()));
  }

  Ok(())
}
