mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fsprov_lib::consts::MANIFEST_FILENAME;
use fsprov_lib::provision::ProvisionError;

use cmd::{cmd_check, cmd_fetch, cmd_init, cmd_install, cmd_plan, cmd_run};
use output::{OutputFormat, print_error};

/// fsprov - provision fastStructure and its scientific stack from source
#[derive(Parser)]
#[command(name = "fsprov")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Defaults to `install`
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Fetch, build and install every package, then the target
  Install(InstallArgs),

  /// Show what an install would run, without side effects
  Plan {
    #[command(flatten)]
    manifest: ManifestArg,

    /// Installation directory
    #[arg(long)]
    prefix: Option<PathBuf>,

    /// Download cache directory
    #[arg(long)]
    download_dir: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Download every archive into the cache without building
  Fetch {
    #[command(flatten)]
    manifest: ManifestArg,

    /// Download cache directory
    #[arg(long)]
    download_dir: Option<PathBuf>,
  },

  /// Verify an existing installation
  Check {
    #[command(flatten)]
    manifest: ManifestArg,

    /// Installation directory
    #[arg(long)]
    prefix: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Run the installed fastStructure over a range of K
  Run(RunArgs),

  /// Write the built-in manifest to a file for editing
  Init {
    /// Destination (default: fsprov.toml)
    #[arg(default_value = MANIFEST_FILENAME)]
    path: PathBuf,
  },
}

#[derive(Args, Default)]
struct ManifestArg {
  /// Manifest file (default: the built-in fastStructure manifest)
  #[arg(short, long)]
  manifest: Option<PathBuf>,
}

#[derive(Args, Default)]
pub struct InstallArgs {
  #[command(flatten)]
  manifest: ManifestArg,

  /// Installation directory
  #[arg(long)]
  prefix: Option<PathBuf>,

  /// Staging directory to build in; kept afterwards
  #[arg(long)]
  staging: Option<PathBuf>,

  /// Keep the temporary staging directory
  #[arg(long)]
  keep_staging: bool,

  /// Download cache directory
  #[arg(long)]
  download_dir: Option<PathBuf>,

  /// Python interpreter used by the build steps
  #[arg(long)]
  python: Option<String>,

  /// Parallel jobs passed to make
  #[arg(short, long)]
  jobs: Option<usize>,

  /// Capture build output instead of streaming it
  #[arg(long)]
  quiet_builds: bool,
}

#[derive(Args)]
pub struct RunArgs {
  #[command(flatten)]
  manifest: ManifestArg,

  /// Installation directory
  #[arg(long)]
  prefix: Option<PathBuf>,

  /// Largest K to run
  #[arg(short = 'K', long = "max-k")]
  max_k: u32,

  /// Smallest K to run
  #[arg(long, default_value_t = 1)]
  min_k: u32,

  /// Input data: STRUCTURE text or a PLINK .bed/.bim/.fam file
  #[arg(short, long)]
  input: PathBuf,

  /// Directory the results are written to
  #[arg(short, long)]
  output: PathBuf,

  /// Runs at the same time
  #[arg(short, long, default_value_t = 4)]
  threads: usize,

  /// Python interpreter that runs fastStructure
  #[arg(long)]
  python: Option<String>,

  /// Keep a log for every run, not only failed ones
  #[arg(long)]
  log: bool,

  /// Skip choosing the best K
  #[arg(long)]
  no_tests: bool,

  /// Extra arguments passed to every run (after `--`)
  #[arg(last = true)]
  extra: Vec<String>,
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

/// A failed build command exits with its own status; everything else with 1.
fn exit_code(err: &anyhow::Error) -> ExitCode {
  err
    .downcast_ref::<ProvisionError>()
    .and_then(ProvisionError::exit_code)
    .and_then(|code| u8::try_from(code).ok())
    .filter(|&code| code != 0)
    .map(ExitCode::from)
    .unwrap_or(ExitCode::FAILURE)
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let command = cli.command.unwrap_or_else(|| Commands::Install(InstallArgs::default()));
  let result = match command {
    Commands::Install(args) => cmd_install(args),
    Commands::Plan {
      manifest,
      prefix,
      download_dir,
      output,
    } => cmd_plan(manifest.manifest.as_deref(), prefix, download_dir, output),
    Commands::Fetch { manifest, download_dir } => cmd_fetch(manifest.manifest.as_deref(), download_dir),
    Commands::Check {
      manifest,
      prefix,
      output,
    } => cmd_check(manifest.manifest.as_deref(), prefix, output),
    Commands::Run(args) => cmd_run(args),
    Commands::Init { path } => cmd_init(&path),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{err:#}"));
      exit_code(&err)
    }
  }
}
