//! CLI output formatting utilities.
//!
//! Colored status lines with Unicode symbols, paths shown relative to the
//! project root and durations rendered with `humantime`.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use kiln_lib::build::BuildReport;
use kiln_lib::watch::WatchEventKind;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const ADD: &str = "+";
  pub const MODIFY: &str = "~";
  pub const REMOVE: &str = "-";
}

/// Round to milliseconds so `humantime` prints `12ms` rather than nanoseconds.
pub fn format_duration(duration: Duration) -> String {
  let millis = Duration::from_millis(duration.as_millis() as u64);
  humantime::format_duration(millis).to_string()
}

/// `path` relative to `root` when it is inside it.
pub fn display_path(path: &Path, root: &Path) -> String {
  path.strip_prefix(root).unwrap_or(path).display().to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// A watched file event.
pub fn print_change(kind: WatchEventKind, path: &Path, root: &Path) {
  let symbol = match kind {
    WatchEventKind::Add => symbols::ADD,
    WatchEventKind::Change => symbols::MODIFY,
    WatchEventKind::Remove => symbols::REMOVE,
  };
  println!(
    "  {} {} {}",
    symbol.if_supports_color(Stream::Stdout, |s| s.yellow()),
    display_path(path, root),
    format!("({})", kind.as_str()).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

/// Written files followed by a one-line summary.
pub fn print_report(report: &BuildReport, root: &Path) {
  for path in &report.written {
    println!(
      "  {} {}",
      symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.cyan()),
      display_path(path, root)
    );
  }

  if report.admitted == 0 {
    print_success(&format!("Up to date ({} unchanged)", report.skipped));
    return;
  }
  print_success(&format!(
    "Built {} file(s) in {}",
    report.admitted,
    format_duration(report.elapsed)
  ));
  if report.skipped > 0 {
    print_stat("Unchanged", &report.skipped.to_string());
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_micros(50_400)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
  }

  #[test]
  fn test_display_path() {
    let root = PathBuf::from("/site");
    assert_eq!(display_path(Path::new("/site/dist/app.js"), &root), "dist/app.js");
    assert_eq!(display_path(Path::new("/elsewhere/app.js"), &root), "/elsewhere/app.js");
  }
}
