//! Cache file persistence.
//!
//! The cache file is a single JSON document holding the signature map and the
//! forward dependency edges:
//!
//! ```json
//! { "cache": { "/site/src/a.js": "..." }, "deps": { "/site/src/a.js": ["/site/src/b.js"] } }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::content::SerializedCache;
use super::gate::IncrementalGate;
use crate::graph::SerializedDeps;

#[derive(Debug, Error)]
pub enum CacheFileError {
  #[error("failed to read cache file {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse cache file {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize cache: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write cache file {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
  #[serde(default)]
  pub cache: SerializedCache,
  #[serde(default)]
  pub deps: SerializedDeps,
}

impl CacheFile {
  pub fn from_gate(gate: &IncrementalGate) -> Self {
    let (cache, deps) = gate.serialize();
    Self { cache, deps }
  }

  /// Read a cache file. A file that does not exist yet yields `Ok(None)`.
  pub fn load(path: &Path) -> Result<Option<Self>, CacheFileError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(CacheFileError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let file = serde_json::from_str(&content).map_err(|source| CacheFileError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Some(file))
  }

  /// Write atomically: temp file next to the target, then rename.
  pub fn save(&self, path: &Path) -> Result<(), CacheFileError> {
    let write_err = |source: io::Error| CacheFileError::Write {
      path: path.to_path_buf(),
      source,
    };

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    let content = serde_json::to_string(self).map_err(CacheFileError::Serialize)?;
    fs::write(&temp_path, content).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;

    debug!(path = %path.display(), entries = self.cache.len(), "saved cache file");
    Ok(())
  }

  /// Restore `gate` from the file at `path`.
  ///
  /// A malformed or unreadable file is discarded with a warning and the gate is
  /// left cold. Returns whether anything was restored.
  pub fn restore_into(path: &Path, gate: &mut IncrementalGate) -> bool {
    match Self::load(path) {
      Ok(Some(file)) => {
        debug!(path = %path.display(), entries = file.cache.len(), "restored cache file");
        gate.deserialize(file.cache, file.deps);
        true
      }
      Ok(None) => false,
      Err(e) => {
        warn!(error = %e, "discarding cache file, starting cold");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;
  use tracing_test::traced_test;

  use super::*;
  use crate::cache::content::ContentCache;
  use crate::util::testutil::{content_deps_graph, loader};

  #[test]
  fn save_then_load_restores_gate() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested/.kiln-cache.json");

    let mut gate = IncrementalGate::new(ContentCache::default(), content_deps_graph());
    let mut fs = loader(&[("/b.txt", "")]);
    gate.register("/a.txt", b"/b.txt", Some(b"payload".to_vec()), &mut fs);
    CacheFile::from_gate(&gate).save(&path).unwrap();

    let mut restored = IncrementalGate::new(ContentCache::default(), content_deps_graph());
    assert!(CacheFile::restore_into(&path, &mut restored));
    assert!(restored.test("/a.txt", b"/b.txt", &mut fs));
    assert_eq!(restored.graph().in_deps("/b.txt"), ["/a.txt"]);
    // payloads are never persisted
    assert!(restored.get("/a.txt").is_none());
  }

  #[test]
  fn wire_format_has_cache_and_deps() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cache.json");

    let mut file = CacheFile::default();
    file.cache.insert("/a.txt".to_string(), "sig".to_string());
    file.deps.insert("/a.txt".to_string(), vec!["/b.txt".to_string()]);
    file.save(&path).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["cache"]["/a.txt"], "sig");
    assert_eq!(raw["deps"]["/a.txt"][0], "/b.txt");
    assert!(!temp.path().join("cache.json.tmp").exists());
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let temp = TempDir::new().unwrap();
    assert!(CacheFile::load(&temp.path().join("nope.json")).unwrap().is_none());
  }

  #[test]
  #[traced_test]
  fn malformed_file_is_discarded_with_warning() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cache.json");
    fs::write(&path, "{ not json").unwrap();

    let mut gate = IncrementalGate::new(ContentCache::default(), content_deps_graph());
    assert!(!CacheFile::restore_into(&path, &mut gate));
    assert!(gate.cache().is_empty());
    assert!(logs_contain("discarding cache file"));
  }
}
