//! Project configuration (`kiln.toml`).
//!
//! Loading happens in two steps: [`types`] holds the raw serde shapes, and
//! [`load`] resolves them into a [`Config`] with absolute paths, built rules
//! and dependency scanners.

pub mod load;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::GlobSet;
use thiserror::Error;

use crate::cache::{ContentCache, IncrementalGate, Signer};
use crate::graph::{DependencyGraph, ScannerSet};
use crate::mode::BuildMode;
use crate::rule::RuleSet;
use crate::util::path::relative_slash;

pub use load::{load_config, load_config_from_str};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("rule '{rule}' uses undefined task '{task}'")]
  UndefinedTask { rule: String, task: String },

  #[error("invalid exclude glob for '{rule}': {source}")]
  InvalidGlob {
    rule: String,
    #[source]
    source: globset::Error,
  },

  #[error("rule '{rule}' has an invalid dependency pattern: {source}")]
  InvalidPattern {
    rule: String,
    #[source]
    source: regex::Error,
  },

  #[error("invalid base path '{0}': must start with '/'")]
  InvalidBasePath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevConfig {
  pub port: u16,
  /// Always starts and ends with `/`.
  pub base_path: String,
}

/// A fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
  /// Directory containing the config file; relative paths resolve against it.
  pub root: PathBuf,
  pub input: PathBuf,
  pub output: PathBuf,
  pub cache_file: PathBuf,
  pub signer: Signer,
  pub mode: BuildMode,
  pub rules: Arc<RuleSet>,
  pub scanners: Arc<ScannerSet>,
  pub dev: DevConfig,
  pub exclude: GlobSet,
}

impl Config {
  /// Whether `path` matches a top-level `exclude` glob.
  pub fn is_excluded(&self, path: &Path) -> bool {
    if self.exclude.is_empty() {
      return false;
    }
    match relative_slash(path, &self.input) {
      Some(rel) => self.exclude.is_match(rel),
      None => self.exclude.is_match(path),
    }
  }

  /// A fresh, empty gate using this config's signer and dependency scanners.
  pub fn new_gate(&self) -> IncrementalGate {
    IncrementalGate::new(
      ContentCache::new(self.signer),
      DependencyGraph::new(self.scanners.clone()),
    )
  }
}
