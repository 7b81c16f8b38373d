//! Test helpers for kiln-lib.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::graph::DependencyGraph;

/// Each file depends on the single identity named by its content, if any.
pub fn content_deps_graph() -> DependencyGraph {
  DependencyGraph::new(Arc::new(|_: &str, content: &str| {
    if content.is_empty() {
      vec![]
    } else {
      vec![content.to_string()]
    }
  }))
}

/// Every file depends on the same fixed identities.
pub fn fixed_deps_graph(deps: &'static [&'static str]) -> DependencyGraph {
  DependencyGraph::new(Arc::new(move |_: &str, _: &str| {
    deps.iter().map(|d| d.to_string()).collect::<Vec<_>>()
  }))
}

/// In-memory content loader.
pub fn loader(files: &[(&str, &str)]) -> HashMap<String, Vec<u8>> {
  files
    .iter()
    .map(|(id, content)| (id.to_string(), content.as_bytes().to_vec()))
    .collect()
}

/// Write `files` (relative path, content) under `root`, creating directories.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
  for (rel, content) in files {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
  }
}

/// Shell script for a command task that uppercases its input.
#[cfg(unix)]
pub const UPPERCASE_SCRIPT: &str = "tr '[:lower:]' '[:upper:]'";
