//! Dependency-aware cache gate.
//!
//! Combines the [`ContentCache`] with the [`DependencyGraph`] so that a file is
//! considered stale when either its own content or the content of one of its
//! direct dependencies changed since the last commit.
//!
//! Only one level of dependencies is checked per [`IncrementalGate::test`]
//! call. Transitive staleness is still caught because
//! [`IncrementalGate::register`] commits the whole dependency subtree, which
//! keeps every single-level signature authoritative between calls.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::content::{ContentCache, SerializedCache};
use crate::graph::{DependencyGraph, SerializedDeps};

/// Loads the current content of an identity.
///
/// `None` means the file does not exist or cannot be read. That is an expected
/// outcome, never an error: callers treat it as "changed".
pub trait ContentLoader {
  fn load(&mut self, id: &str) -> Option<Vec<u8>>;
}

/// Reads identities straight from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl ContentLoader for FsLoader {
  fn load(&mut self, id: &str) -> Option<Vec<u8>> {
    std::fs::read(id).ok()
  }
}

impl ContentLoader for HashMap<String, Vec<u8>> {
  fn load(&mut self, id: &str) -> Option<Vec<u8>> {
    self.get(id).cloned()
  }
}

pub(crate) fn as_text(content: &[u8]) -> std::borrow::Cow<'_, str> {
  String::from_utf8_lossy(content)
}

#[derive(Debug)]
pub struct IncrementalGate {
  cache: ContentCache,
  graph: DependencyGraph,
}

impl IncrementalGate {
  pub fn new(cache: ContentCache, graph: DependencyGraph) -> Self {
    Self { cache, graph }
  }

  pub fn cache(&self) -> &ContentCache {
    &self.cache
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  pub fn graph_mut(&mut self) -> &mut DependencyGraph {
    &mut self.graph
  }

  /// Whether `id` with `content` can be served from cache.
  ///
  /// False as soon as the file's own signature differs. Otherwise every current
  /// forward edge is checked against the cache, reading the dependency through
  /// `loader`; a missing dependency counts as changed so that the transform gets
  /// to report it.
  pub fn test(&self, id: &str, content: &[u8], loader: &mut impl ContentLoader) -> bool {
    if !self.cache.test(id, content) {
      return false;
    }

    self.graph.out_deps(id).iter().all(|dep| match loader.load(dep) {
      Some(dep_content) => self.cache.test(dep, &dep_content),
      None => {
        trace!(id, dep = %dep, "dependency missing, treating as changed");
        false
      }
    })
  }

  /// Commit `id` and every stale file in its dependency subtree.
  ///
  /// The root is always stored with its payload and relinked in the graph.
  /// Dependencies whose cached signature already matches their current content
  /// are pruned, together with their own subtree. Dependencies that can no
  /// longer be loaded are cleared from cache and graph; their dependents are
  /// left alone.
  pub fn register(&mut self, id: &str, content: &[u8], payload: Option<Vec<u8>>, loader: &mut impl ContentLoader) {
    self.cache.register(id, content, payload);
    self.graph.register(id, &as_text(content));

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(id.to_string());
    let mut stack: Vec<String> = self.graph.out_deps(id).iter().rev().cloned().collect();

    while let Some(dep) = stack.pop() {
      if !visited.insert(dep.clone()) {
        continue;
      }

      let Some(dep_content) = loader.load(&dep) else {
        debug!(id, dep = %dep, "dependency missing, clearing");
        self.clear(&dep);
        continue;
      };

      if self.cache.test(&dep, &dep_content) {
        trace!(dep = %dep, "dependency unchanged, pruning");
        continue;
      }

      self.cache.register(&dep, &dep_content, None);
      self.graph.register(&dep, &as_text(&dep_content));
      stack.extend(self.graph.out_deps(&dep).iter().rev().cloned());
    }
  }

  /// Drop `id` from both cache and graph. Dependents are not touched.
  pub fn clear(&mut self, id: &str) {
    self.cache.clear(id);
    self.graph.clear(id);
  }

  pub fn get(&self, id: &str) -> Option<&[u8]> {
    self.cache.get(id)
  }

  pub fn serialize(&self) -> (SerializedCache, SerializedDeps) {
    (self.cache.serialize(), self.graph.serialize())
  }

  pub fn deserialize(&mut self, cache: SerializedCache, deps: SerializedDeps) {
    self.cache.deserialize(cache);
    self.graph.deserialize(deps);
  }
}
