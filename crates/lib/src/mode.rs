//! Build mode selection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::MODE_ENV;

/// Whether a build targets development or production.
///
/// Command tasks receive the mode as `KILN_ENV` and tasks may be limited to
/// a single mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  #[default]
  Dev,
  Prod,
}

impl BuildMode {
  /// `Prod` when `KILN_ENV` is `production`, `Dev` otherwise.
  pub fn from_env() -> Self {
    match std::env::var(MODE_ENV) {
      Ok(value) if value.eq_ignore_ascii_case("production") => BuildMode::Prod,
      _ => BuildMode::Dev,
    }
  }

  /// Resolve the mode from an explicit `--production` flag, falling back to the environment.
  pub fn resolve(production: bool) -> Self {
    if production { BuildMode::Prod } else { Self::from_env() }
  }

  /// Value exported to command tasks.
  pub fn env_value(self) -> &'static str {
    match self {
      BuildMode::Dev => "development",
      BuildMode::Prod => "production",
    }
  }
}

impl fmt::Display for BuildMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.env_value())
  }
}
