mod build;
mod dev;
mod watch;

use std::path::Path;

use anyhow::{Context, Result};
use kiln_lib::build::{Builder, InputOptions};
use kiln_lib::config::{Config, load_config};
use kiln_lib::mode::BuildMode;
use tracing::debug;

use crate::BuildArgs;

pub use build::cmd_build;
pub use dev::cmd_dev;
pub use watch::cmd_watch;

fn load(path: &Path, mode: BuildMode) -> Result<Config> {
  let config = load_config(path, mode).with_context(|| format!("Failed to load config {}", path.display()))?;
  debug!(root = %config.root.display(), mode = %mode, "config loaded");
  Ok(config)
}

/// A builder honoring `--cache` / `--no-cache`.
fn builder(mut config: Config, args: &BuildArgs) -> Builder {
  if args.no_cache {
    return Builder::new(config);
  }
  if let Some(cache) = &args.cache {
    config.cache_file = cache.clone();
  }
  Builder::with_cache(config)
}

fn input_options(args: &BuildArgs) -> InputOptions {
  InputOptions {
    dot: args.dot,
    filter: args.filter.clone(),
  }
}
