//! Request path resolution for the dev server.
//!
//! Maps a requested path to the input file it is built from by inverting the
//! rule table. Only path logic lives here; reading, caching and transforming
//! happen in the server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use crate::config::Config;
use crate::pipeline::Task;

/// What to do with a request.
#[derive(Debug, Clone)]
pub enum Resolution {
  /// Outside the base path.
  NotFound,
  /// Redirect to the given location.
  Redirect(String),
  /// No rule or input matched; hand the path (relative to the base path,
  /// with a leading `/`) to the next handler.
  Next(String),
  /// Build `input` with `task` and serve the result as `output`. The task
  /// sees the asset at `target`, the input path with the output extension.
  Transform {
    input: PathBuf,
    target: PathBuf,
    output: String,
    task: Arc<dyn Task>,
  },
}

/// Resolve `request_path` against the config's base path and rules, checking
/// candidates with `exists`.
pub fn resolve(config: &Config, request_path: &str, exists: impl Fn(&Path) -> bool) -> Resolution {
  let base = config.dev.base_path.as_str();
  if base != "/" && format!("{}/", request_path) == base {
    return Resolution::Redirect(base.to_string());
  }

  let mut path = request_path.to_string();
  if path.ends_with('/') {
    path.push_str("index.html");
  }

  let Some(rest) = path.strip_prefix(base) else {
    trace!(path = %request_path, base, "outside base path");
    return Resolution::NotFound;
  };
  let output = format!("/{}", rest);
  if output.split('/').any(|segment| segment == "..") {
    return Resolution::NotFound;
  }

  let Some(rule) = config.rules.find_rule_by_output(&output, &config.input, &exists) else {
    trace!(path = %output, "no rule or input, passing on");
    return Resolution::Next(output);
  };

  let input = config.input.join(rule.input_path(&output).trim_start_matches('/'));
  if config.is_excluded(&input) {
    trace!(input = %input.display(), "input excluded, passing on");
    return Resolution::Next(output);
  }
  if input.is_dir() {
    return Resolution::Redirect(format!("{}/", request_path));
  }

  let target = PathBuf::from(rule.output_path(&input.to_string_lossy()));
  Resolution::Transform {
    input,
    target,
    output,
    task: rule.task(),
  }
}
