//! Continuous rebuilds.
//!
//! Filesystem events are coalesced into bursts, mapped to dirty sets by the
//! [`WatchCoordinator`], and the union of each burst's dirty sets is rebuilt as
//! one batch through the [`Builder`]. A failing batch is reported and the loop
//! keeps going.

pub mod coordinator;
pub mod fs;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::build::{BuildError, BuildReport, Builder};
use crate::cache::FsLoader;
use crate::consts::WATCH_DEBOUNCE_MS;

pub use coordinator::{WatchCoordinator, WatchEventKind};
pub use fs::{FsEvent, FsWatcher, next_burst, watch_dir};

#[derive(Debug, Error)]
pub enum WatchError {
  #[error("failed to watch files: {0}")]
  Notify(#[from] notify::Error),
}

/// Progress notifications from [`watch`].
#[derive(Debug)]
pub enum WatchNotice {
  /// A file was added or changed.
  Changed { kind: WatchEventKind, path: String },
  /// A rebuild finished.
  Built(BuildReport),
  /// A rebuild failed; the cache was left untouched.
  Failed(BuildError),
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
  /// Quiet window used to coalesce bursts of events.
  pub debounce: Duration,
}

impl Default for WatchOptions {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(WATCH_DEBOUNCE_MS),
    }
  }
}

/// Rebuild dirty files until `events` closes.
pub async fn watch(
  builder: &mut Builder,
  mut events: mpsc::UnboundedReceiver<FsEvent>,
  options: &WatchOptions,
  mut on_notice: impl FnMut(WatchNotice),
) -> Result<(), WatchError> {
  info!(input = %builder.config().input.display(), "watching for changes");

  while let Some(burst) = next_burst(&mut events, options.debounce).await {
    let mut dirty: Vec<String> = Vec::new();
    let mut changed: Vec<(WatchEventKind, String)> = Vec::new();

    {
      let mut coordinator = WatchCoordinator::new(|kind, files: Vec<String>, origin: &str| {
        changed.push((kind, origin.to_string()));
        for file in files {
          if !dirty.contains(&file) {
            dirty.push(file);
          }
        }
      });
      let graph = builder.gate_mut().graph_mut();
      for event in burst {
        coordinator.handle(graph, event.kind, &event.path, &mut FsLoader);
      }
    }

    for (kind, path) in changed {
      on_notice(WatchNotice::Changed { kind, path });
    }

    let config = builder.config();
    let paths: Vec<PathBuf> = dirty
      .into_iter()
      .map(PathBuf::from)
      .filter(|path| path.starts_with(&config.input) && !path.starts_with(&config.output) && !config.is_excluded(path))
      .collect();
    if paths.is_empty() {
      debug!("nothing to rebuild");
      continue;
    }

    debug!(files = paths.len(), "rebuilding");
    match builder.run_batch(paths).await {
      Ok(report) => on_notice(WatchNotice::Built(report)),
      Err(e) => {
        warn!(error = %e, "rebuild failed");
        on_notice(WatchNotice::Failed(e));
      }
    }
  }

  Ok(())
}
