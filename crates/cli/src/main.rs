//! kiln - incremental asset pipeline.

mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use kiln_lib::consts::{CONFIG_FILENAME, LOG_ENV};
use kiln_lib::mode::BuildMode;
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about = "Incremental asset pipeline for static sites", long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug). KILN_LOG takes precedence.
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  /// Path to the config file
  #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
  config: PathBuf,

  /// Build in production mode (same as KILN_ENV=production)
  #[arg(long, global = true)]
  production: bool,

  #[command(subcommand)]
  command: Commands,
}

/// Options shared by commands that write the output directory.
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
  /// Cache file to use instead of the configured one
  #[arg(long)]
  cache: Option<PathBuf>,

  /// Start cold and do not write the cache file
  #[arg(long, conflicts_with = "cache")]
  no_cache: bool,

  /// Include dotfiles
  #[arg(long)]
  dot: bool,

  /// Only build inputs matching this glob (relative to the input directory)
  #[arg(long)]
  filter: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Build every changed input
  Build {
    #[command(flatten)]
    args: BuildArgs,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Build, then rebuild whenever inputs change
  Watch {
    #[command(flatten)]
    args: BuildArgs,

    /// Quiet window used to group file events (e.g. "100ms", "1s")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "100ms")]
    debounce: Duration,
  },

  /// Serve inputs, building each requested file on demand
  Dev {
    /// Port to listen on (defaults to the configured port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path prefix the site is served under
    #[arg(long)]
    base_path: Option<String>,
  },
}

fn init_tracing(verbose: u8) {
  let fallback = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let mode = BuildMode::resolve(cli.production);
  let result = match cli.command {
    Commands::Build { args, output } => cmd::cmd_build(&cli.config, mode, &args, output),
    Commands::Watch { args, debounce } => cmd::cmd_watch(&cli.config, mode, &args, debounce),
    Commands::Dev { port, base_path } => cmd::cmd_dev(&cli.config, mode, port, base_path.as_deref()),
  };

  if let Err(e) = result {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}
