//! Implementation of the `kiln watch` command.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use kiln_lib::mode::BuildMode;
use kiln_lib::watch::{WatchNotice, WatchOptions, watch, watch_dir};

use super::{builder, input_options, load};
use crate::BuildArgs;
use crate::output::{print_change, print_error, print_info, print_report};

/// Build once, then rebuild changed files and their dependents until interrupted.
///
/// A failing rebuild is reported and watching continues; the cache file is
/// saved after every successful cycle.
pub fn cmd_watch(config_path: &Path, mode: BuildMode, args: &BuildArgs, debounce: Duration) -> Result<()> {
  let config = load(config_path, mode)?;
  let root = config.root.clone();
  let input = config.input.clone();
  let mut builder = builder(config, args);
  let options = input_options(args);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    match builder.build(&options).await {
      Ok(report) => print_report(&report, &root),
      Err(e) => print_error(&format!("Initial build failed: {}", e)),
    }

    let (_watcher, events) =
      watch_dir(&input).with_context(|| format!("Failed to watch {}", input.display()))?;
    print_info(&format!("Watching {}", input.display()));

    let watch_options = WatchOptions { debounce };
    let on_notice = |notice: WatchNotice| match notice {
      WatchNotice::Changed { kind, path } => print_change(kind, Path::new(&path), &root),
      WatchNotice::Built(report) => print_report(&report, &root),
      WatchNotice::Failed(e) => print_error(&format!("Rebuild failed: {}", e)),
    };

    tokio::select! {
      result = watch(&mut builder, events, &watch_options, on_notice) => result.context("Watch failed")?,
      _ = tokio::signal::ctrl_c() => print_info("Stopped watching"),
    }
    Ok::<_, anyhow::Error>(())
  })
}
