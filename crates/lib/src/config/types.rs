//! Raw `kiln.toml` shapes, as deserialized before path resolution.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::cache::Signer;
use crate::mode::BuildMode;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
  #[serde(default = "default_input")]
  pub input: String,
  #[serde(default = "default_output")]
  pub output: String,
  /// Cache file location; defaults to `.kiln-cache.json` next to the config.
  pub cache: Option<String>,
  #[serde(default)]
  pub signer: Signer,
  /// Input files never built, watched or served, relative to the input root.
  #[serde(default)]
  pub exclude: OneOrMany,
  #[serde(default)]
  pub tasks: BTreeMap<String, RawTask>,
  #[serde(default)]
  pub rules: BTreeMap<String, RawRule>,
  #[serde(default)]
  pub dev: RawDev,
}

fn default_input() -> String {
  "src".to_string()
}

fn default_output() -> String {
  "dist".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTask {
  pub command: String,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
  pub cwd: Option<String>,
  /// Only run in this mode; identity otherwise.
  pub mode: Option<BuildMode>,
}

/// A rule is either a bare task name or a full table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRule {
  Task(String),
  Table(RawRuleTable),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRuleTable {
  pub task: String,
  pub output_ext: Option<String>,
  #[serde(default)]
  pub exclude: OneOrMany,
  pub deps: Option<RawDeps>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

impl Default for OneOrMany {
  fn default() -> Self {
    OneOrMany::Many(Vec::new())
  }
}

impl OneOrMany {
  pub fn into_vec(self) -> Vec<String> {
    match self {
      OneOrMany::One(s) => vec![s],
      OneOrMany::Many(v) => v,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDeps {
  pub patterns: Vec<String>,
  /// Directory that `/`-prefixed references resolve against; defaults to the input root.
  pub root: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDev {
  pub port: Option<u16>,
  pub base_path: Option<String>,
}
