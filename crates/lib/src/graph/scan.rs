//! Regex-driven dependency scanning.
//!
//! Each rule may declare patterns whose first capture group names a referenced
//! file (an `import`, `@use`, `include` and so on). References are resolved to
//! identities relative to the referencing file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use super::DependencyExtractor;
use crate::util::path::{extension_of, identity};

/// Dependency scanner for files of a single input extension.
#[derive(Debug, Clone)]
pub struct DepScanner {
  ext: String,
  patterns: Vec<Regex>,
  /// Directory that root-relative references (`/partials/x`) resolve against.
  root: Option<PathBuf>,
}

impl DepScanner {
  pub fn new(ext: &str, patterns: &[String], root: Option<PathBuf>) -> Result<Self, regex::Error> {
    let patterns = patterns.iter().map(|p| Regex::new(p)).collect::<Result<Vec<_>, _>>()?;
    Ok(Self {
      ext: ext.to_lowercase(),
      patterns,
      root,
    })
  }

  pub fn scan(&self, id: &str, content: &str) -> Vec<String> {
    let file = Path::new(id);
    let dir = file.parent().unwrap_or(Path::new(""));

    let mut deps = Vec::new();
    for pattern in &self.patterns {
      for caps in pattern.captures_iter(content) {
        let Some(reference) = caps.get(1).map(|m| m.as_str().trim()) else {
          continue;
        };
        if reference.is_empty() || reference.contains("://") {
          continue;
        }
        let dep = identity(&self.resolve(dir, reference));
        if !deps.contains(&dep) {
          deps.push(dep);
        }
      }
    }
    deps
  }

  fn resolve(&self, dir: &Path, reference: &str) -> PathBuf {
    let mut path = match (reference.strip_prefix('/'), &self.root) {
      (Some(stripped), Some(root)) => root.join(stripped),
      (Some(_), None) => PathBuf::from(reference),
      (None, _) => dir.join(reference),
    };
    if path.extension().is_none() {
      path.set_extension(&self.ext);
    }
    path
  }
}

/// Dispatches to the scanner registered for a file's extension.
#[derive(Debug, Clone, Default)]
pub struct ScannerSet {
  by_ext: HashMap<String, DepScanner>,
}

impl ScannerSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, scanner: DepScanner) {
    self.by_ext.insert(scanner.ext.clone(), scanner);
  }

  pub fn is_empty(&self) -> bool {
    self.by_ext.is_empty()
  }
}

impl DependencyExtractor for ScannerSet {
  fn extract(&self, id: &str, content: &str) -> Vec<String> {
    extension_of(Path::new(id))
      .and_then(|ext| self.by_ext.get(&ext))
      .map(|scanner| scanner.scan(id, content))
      .unwrap_or_default()
  }
}
