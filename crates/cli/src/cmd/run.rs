//! Implementation of the `fsprov run` command.
//!
//! Runs the installed fastStructure once per K over a worker pool, reports
//! failed runs with their logs, and picks the model after a clean sweep.

use anyhow::{Context, Result, bail};
use owo_colors::{OwoColorize, Stream};

use fsprov_lib::env::BuildEnv;
use fsprov_lib::platform::paths;
use fsprov_lib::provision::{BuildSettings, ProvisionOptions, runtime_env};
use fsprov_lib::runner::{RunOptions, choose_k, installed_entry_point, run_all};

use super::{load_manifest, or_default};
use crate::RunArgs;
use crate::output::{format_duration, print_info, print_stat, print_success, print_warning, symbols};

pub fn cmd_run(args: RunArgs) -> Result<()> {
  let manifest = load_manifest(args.manifest.manifest.as_deref())?;
  let prefix = or_default(args.prefix, paths::default_prefix);
  let prefix = dunce::canonicalize(&prefix).unwrap_or(prefix);

  let entry_point = installed_entry_point(&prefix, &manifest)
    .with_context(|| format!("No usable installation under {} (run `fsprov install` first)", prefix.display()))?;

  let settings = BuildSettings::resolve(
    &ProvisionOptions {
      prefix: prefix.clone(),
      python: args.python,
      jobs: Some(args.threads),
      ..Default::default()
    },
    &manifest,
  );
  let env = runtime_env(&manifest, &prefix, &settings, BuildEnv::capture());

  let options = RunOptions {
    python: settings.python,
    entry_point,
    input: args.input,
    output: args.output,
    min_k: args.min_k,
    max_k: args.max_k,
    threads: args.threads,
    log_all: args.log,
    extra_args: args.extra,
    env: env.into_vars(),
  };

  print_info(&format!(
    "Running {} for K={}..{} with {} thread(s)",
    manifest.target.label(),
    options.min_k,
    options.max_k,
    options.threads
  ));

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(run_all(&options)).context("Run failed")?;

  println!();
  for run in &report.runs {
    if run.success {
      let symbol = symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string();
      println!("  {} K={} ({})", symbol, run.k, format_duration(run.duration));
    } else {
      let symbol = symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string();
      let code = run.exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
      println!("  {} K={} (exit code {})", symbol, run.k, code);
    }
  }
  println!();

  let failed: Vec<_> = report.failures().collect();
  if !failed.is_empty() {
    print_warning(&format!(
      "{} run(s) exited with errors. Check the log files:",
      failed.len()
    ));
    for run in &failed {
      if let Some(log) = &run.log {
        println!("    {}", log.display());
      }
    }
    bail!("{} of {} fastStructure runs failed", failed.len(), report.runs.len());
  }

  print_success(&format!("All {} runs finished successfully", report.runs.len()));

  if !args.no_tests {
    let choice = choose_k(&report.output).context("Model choice failed")?;
    print_stat("Best K (marginal likelihood)", &choice.likelihood_k.to_string());
    print_stat("Best K (components used)", &choice.components_k.to_string());
    print_stat("Model choice", &choice.path.display().to_string());
  }

  print_stat("Results", &report.output.display().to_string());
  print_stat("Duration", &format_duration(report.duration));

  Ok(())
}
