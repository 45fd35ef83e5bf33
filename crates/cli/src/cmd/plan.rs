//! Implementation of the `fsprov plan` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use fsprov_lib::platform::paths;
use fsprov_lib::provision::{ProvisionOptions, plan};

use super::{load_manifest, or_default};
use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols};

pub fn cmd_plan(
  manifest: Option<&Path>,
  prefix: Option<PathBuf>,
  download_dir: Option<PathBuf>,
  output: OutputFormat,
) -> Result<()> {
  let manifest = load_manifest(manifest)?;
  let options = ProvisionOptions {
    prefix: or_default(prefix, paths::default_prefix),
    download_dir: or_default(download_dir, paths::default_download_dir),
    ..ProvisionOptions::default()
  };

  let plan = plan(&manifest, &options).context("Failed to resolve manifest templates")?;

  if output.is_json() {
    return print_json(&plan);
  }

  print_info(&format!("Plan for {}", plan.prefix.display()));
  print_stat("Downloads", &plan.download_dir.display().to_string());
  print_stat("Python", &plan.settings.python);
  print_stat("Jobs", &plan.settings.jobs.to_string());

  for (index, package) in plan.packages.iter().enumerate() {
    println!();
    let marker = if package.target { " (target)" } else { "" };
    println!(
      "{}. {}-{}{}",
      index + 1,
      package.name.if_supports_color(Stream::Stdout, |s| s.bold()),
      package.version,
      marker
    );
    let state = if package.cached { "cached" } else { "download" };
    println!("   {} {} [{}]", symbols::ARROW, package.url, state);
    for op in &package.env {
      println!(
        "   {}",
        format!("env {}", serde_json::to_string(op)?).if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
    for command in &package.commands {
      println!("   $ {command}");
    }
  }

  println!();
  print_stat(
    "Archives to download",
    &format!("{} of {}", plan.download_count(), plan.packages.len()),
  );

  Ok(())
}
