//! Batch builds.
//!
//! A batch reads every requested input, asks the [`ChangeFilter`] which ones
//! need work, routes those through the rule lanes and writes the results under
//! the output directory. The cache is committed only once the router has
//! drained without error, then persisted to the cache file.
//!
//! # Submodules
//!
//! - [`filter`] - change detection with deferred commit
//! - [`inputs`] - input enumeration

pub mod filter;
pub mod inputs;

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cache::{CacheFile, CacheFileError, FsLoader, IncrementalGate};
use crate::config::Config;
use crate::consts::LANE_CAPACITY;
use crate::pipeline::{Asset, Router, TaskError};
use crate::util::path::identity;

pub use filter::{ChangeFilter, PendingBatch};
pub use inputs::{InputOptions, collect_inputs};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("failed to walk {}: {source}", path.display())]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("invalid filter glob '{pattern}': {source}")]
  InvalidFilter {
    pattern: String,
    #[source]
    source: globset::Error,
  },

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Task(#[from] TaskError),

  #[error(transparent)]
  CacheFile(#[from] CacheFileError),

  #[error("output writer stopped unexpectedly: {0}")]
  Writer(String),
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
  /// Files that needed work and went through the router.
  pub admitted: usize,
  /// Files the cache said were up to date.
  pub skipped: usize,
  /// Output files written, in completion order.
  pub written: Vec<PathBuf>,
  pub elapsed: Duration,
}

/// Owns the incremental gate for batch and watch builds.
#[derive(Debug)]
pub struct Builder {
  config: Config,
  gate: IncrementalGate,
  persist: bool,
}

impl Builder {
  /// A builder with a cold cache that is never persisted.
  pub fn new(config: Config) -> Self {
    let gate = config.new_gate();
    Self {
      config,
      gate,
      persist: false,
    }
  }

  /// A builder restored from, and saving to, the config's cache file.
  pub fn with_cache(config: Config) -> Self {
    let mut gate = config.new_gate();
    CacheFile::restore_into(&config.cache_file, &mut gate);
    Self {
      config,
      gate,
      persist: true,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn gate(&self) -> &IncrementalGate {
    &self.gate
  }

  pub fn gate_mut(&mut self) -> &mut IncrementalGate {
    &mut self.gate
  }

  pub fn into_gate(self) -> IncrementalGate {
    self.gate
  }

  /// Build every input under the input root.
  pub async fn build(&mut self, options: &InputOptions) -> Result<BuildReport, BuildError> {
    info!(input = %self.config.input.display(), mode = %self.config.mode, "starting build");
    let inputs = collect_inputs(&self.config, options)?;
    self.run_batch(inputs).await
  }

  /// Build exactly `paths`. Paths that no longer exist are skipped.
  pub async fn run_batch(&mut self, paths: Vec<PathBuf>) -> Result<BuildReport, BuildError> {
    let start = Instant::now();
    let mut report = BuildReport::default();

    let (feed_tx, feed_rx) = mpsc::channel(LANE_CAPACITY);
    let mut output = Router::new(self.config.rules.clone()).spawn(feed_rx);

    let output_dir = self.config.output.clone();
    let writer = tokio::spawn(async move {
      let mut written = Vec::new();
      while let Some(item) = output.recv().await {
        let asset = item?;
        written.push(write_output(&output_dir, &asset).await?);
      }
      Ok::<_, BuildError>(written)
    });

    let mut filter = ChangeFilter::new(&self.gate, FsLoader);
    for path in paths {
      let contents = match tokio::fs::read(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound || e.kind() == io::ErrorKind::IsADirectory => {
          debug!(path = %path.display(), "input vanished, skipping");
          continue;
        }
        Err(source) => return Err(BuildError::Read { path, source }),
      };

      if !filter.admit(&identity(&path), &contents) {
        report.skipped += 1;
        continue;
      }
      report.admitted += 1;

      let asset = Asset::new(path, self.config.input.clone(), contents);
      if feed_tx.send(asset).await.is_err() {
        // the writer gave up; its error is collected below
        break;
      }
    }
    let batch = filter.finish();
    drop(feed_tx);

    report.written = writer.await.map_err(|e| BuildError::Writer(e.to_string()))??;
    batch.commit(&mut self.gate);

    if self.persist {
      self.save_cache()?;
    }

    report.elapsed = start.elapsed();
    info!(
      admitted = report.admitted,
      skipped = report.skipped,
      written = report.written.len(),
      "build complete"
    );
    Ok(report)
  }

  pub fn save_cache(&self) -> Result<(), BuildError> {
    CacheFile::from_gate(&self.gate).save(&self.config.cache_file)?;
    Ok(())
  }
}

/// Write `asset` under `output_dir`, keeping its path relative to the input root.
pub async fn write_output(output_dir: &std::path::Path, asset: &Asset) -> Result<PathBuf, BuildError> {
  let dest = output_dir.join(asset.relative());
  if let Some(parent) = dest.parent() {
    tokio::fs::create_dir_all(parent).await.map_err(|source| BuildError::Write {
      path: parent.to_path_buf(),
      source,
    })?;
  }
  tokio::fs::write(&dest, &asset.contents).await.map_err(|source| BuildError::Write {
    path: dest.clone(),
    source,
  })?;
  debug!(path = %dest.display(), "wrote output");
  Ok(dest)
}
