//! Implementation of the `kiln build` command.

use std::path::Path;

use anyhow::{Context, Result};
use kiln_lib::mode::BuildMode;
use serde::Serialize;

use super::{builder, input_options, load};
use crate::BuildArgs;
use crate::output::{OutputFormat, print_json, print_report};

#[derive(Debug, Serialize)]
struct BuildSummary {
  admitted: usize,
  skipped: usize,
  written: Vec<String>,
  elapsed_ms: u128,
}

/// Build every input that changed since the cached state.
///
/// Prints each written file and a summary, or a JSON summary with `-o json`.
pub fn cmd_build(config_path: &Path, mode: BuildMode, args: &BuildArgs, output: OutputFormat) -> Result<()> {
  let config = load(config_path, mode)?;
  let root = config.root.clone();
  let mut builder = builder(config, args);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(builder.build(&input_options(args))).context("Build failed")?;

  if output.is_json() {
    return print_json(&BuildSummary {
      admitted: report.admitted,
      skipped: report.skipped,
      written: report.written.iter().map(|p| p.display().to_string()).collect(),
      elapsed_ms: report.elapsed.as_millis(),
    });
  }

  print_report(&report, &root);
  Ok(())
}
