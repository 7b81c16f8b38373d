//! File dependency graph.
//!
//! Nodes live in an arena keyed by identity string and refer to each other by
//! identity only, so the forward/backward back-references never form real
//! reference cycles and the graph serializes as a plain map.
//!
//! # Invariant
//!
//! Edge symmetry: `a` appears in `b.in_deps` iff `b` appears in `a.out_deps`.
//! Every re-registration unlinks the old edges before linking the new ones.

pub mod scan;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

pub use scan::{DepScanner, ScannerSet};

/// Extracts the identities a file depends on from its content.
pub trait DependencyExtractor: Send + Sync {
  fn extract(&self, id: &str, content: &str) -> Vec<String>;
}

impl<F> DependencyExtractor for F
where
  F: Fn(&str, &str) -> Vec<String> + Send + Sync,
{
  fn extract(&self, id: &str, content: &str) -> Vec<String> {
    self(id, content)
  }
}

/// A single file in the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNode {
  pub id: String,
  /// Identities this file depends on, in extraction order.
  pub out_deps: Vec<String>,
  /// Identities depending on this file, in first-registration order.
  pub in_deps: Vec<String>,
}

impl FileNode {
  fn new(id: &str) -> Self {
    Self {
      id: id.to_string(),
      ..Self::default()
    }
  }
}

/// Serialized form: only forward edges are persisted.
pub type SerializedDeps = BTreeMap<String, Vec<String>>;

/// Forward and backward dependency edges for every known file.
pub struct DependencyGraph {
  extractor: Arc<dyn DependencyExtractor>,
  nodes: HashMap<String, FileNode>,
}

impl std::fmt::Debug for DependencyGraph {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DependencyGraph").field("nodes", &self.nodes).finish()
  }
}

impl DependencyGraph {
  pub fn new(extractor: Arc<dyn DependencyExtractor>) -> Self {
    Self {
      extractor,
      nodes: HashMap::new(),
    }
  }

  /// A graph whose files never have dependencies.
  pub fn without_deps() -> Self {
    Self::new(Arc::new(|_: &str, _: &str| Vec::<String>::new()))
  }

  /// Re-extract the dependencies of `id` from `content` and relink its edges.
  pub fn register(&mut self, id: &str, content: &str) {
    let mut new_out = Vec::new();
    for dep in self.extractor.extract(id, content) {
      if !new_out.contains(&dep) {
        new_out.push(dep);
      }
    }
    self.set_out_deps(id, new_out);
  }

  /// Replace the forward edges of `id`, keeping backward edges symmetric.
  fn set_out_deps(&mut self, id: &str, new_out: Vec<String>) {
    let old_out = std::mem::take(&mut self.node_mut(id).out_deps);
    for dep in &old_out {
      if let Some(node) = self.nodes.get_mut(dep) {
        node.in_deps.retain(|d| d != id);
      }
    }

    for dep in &new_out {
      let node = self.node_mut(dep);
      if !node.in_deps.iter().any(|d| d == id) {
        node.in_deps.push(id.to_string());
      }
    }

    trace!(id, deps = ?new_out, "registered dependencies");
    self.node_mut(id).out_deps = new_out;
  }

  /// Remove `id` and unlink it from its dependencies.
  ///
  /// Files depending on `id` keep their forward edge to it; the node is
  /// recreated lazily the next time anything references it.
  pub fn clear(&mut self, id: &str) {
    let Some(node) = self.nodes.remove(id) else {
      return;
    };
    for dep in &node.out_deps {
      if let Some(target) = self.nodes.get_mut(dep) {
        target.in_deps.retain(|d| d != id);
      }
    }
  }

  pub fn get(&self, id: &str) -> Option<&FileNode> {
    self.nodes.get(id)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn out_deps(&self, id: &str) -> &[String] {
    self.nodes.get(id).map(|n| n.out_deps.as_slice()).unwrap_or(&[])
  }

  pub fn in_deps(&self, id: &str) -> &[String] {
    self.nodes.get(id).map(|n| n.in_deps.as_slice()).unwrap_or(&[])
  }

  /// Everything `id` depends on, directly or transitively.
  pub fn forward_closure(&self, id: &str) -> Vec<String> {
    self.closure(id, |node| &node.out_deps)
  }

  /// Everything depending on `id`, directly or transitively.
  pub fn backward_closure(&self, id: &str) -> Vec<String> {
    self.closure(id, |node| &node.in_deps)
  }

  /// Depth-first pre-order walk from the direct neighbours of `id`.
  fn closure(&self, id: &str, edges: impl Fn(&FileNode) -> &Vec<String>) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(id);

    let mut result = Vec::new();
    let mut stack: Vec<&str> = match self.nodes.get(id) {
      Some(node) => edges(node).iter().rev().map(String::as_str).collect(),
      None => return result,
    };

    while let Some(current) = stack.pop() {
      if !visited.insert(current) {
        continue;
      }
      result.push(current.to_string());
      if let Some(node) = self.nodes.get(current) {
        stack.extend(edges(node).iter().rev().map(String::as_str));
      }
    }

    result
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Forward edges of every node that has any.
  pub fn serialize(&self) -> SerializedDeps {
    self
      .nodes
      .values()
      .filter(|node| !node.out_deps.is_empty())
      .map(|node| (node.id.clone(), node.out_deps.clone()))
      .collect()
  }

  /// Replace the graph contents, rebuilding backward edges by replaying every forward edge.
  pub fn deserialize(&mut self, deps: SerializedDeps) {
    self.nodes.clear();
    for (id, out) in deps {
      self.set_out_deps(&id, out);
    }
  }

  fn node_mut(&mut self, id: &str) -> &mut FileNode {
    self.nodes.entry(id.to_string()).or_insert_with(|| FileNode::new(id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Each file depends on the single identity named by its content.
  fn content_graph() -> DependencyGraph {
    DependencyGraph::new(Arc::new(|_: &str, content: &str| {
      if content.is_empty() {
        vec![]
      } else {
        vec![content.to_string()]
      }
    }))
  }

  fn fixed_graph(deps: &'static [&'static str]) -> DependencyGraph {
    DependencyGraph::new(Arc::new(move |_: &str, _: &str| deps.iter().map(|d| d.to_string()).collect()))
  }

  #[test]
  fn register_links_both_directions() {
    let mut graph = fixed_graph(&["/path/to/dep.js"]);

    graph.register("/path/to/origin.js", "");
    assert_eq!(graph.in_deps("/path/to/dep.js"), ["/path/to/origin.js"]);
    assert_eq!(graph.out_deps("/path/to/origin.js"), ["/path/to/dep.js"]);

    graph.register("/path/to/another.js", "");
    assert_eq!(
      graph.in_deps("/path/to/dep.js"),
      ["/path/to/origin.js", "/path/to/another.js"]
    );
  }

  #[test]
  fn register_is_idempotent() {
    let mut graph = fixed_graph(&["/dep.js"]);

    graph.register("/origin.js", "");
    let once = (graph.get("/origin.js").cloned(), graph.get("/dep.js").cloned());
    graph.register("/origin.js", "");
    let twice = (graph.get("/origin.js").cloned(), graph.get("/dep.js").cloned());

    assert_eq!(once, twice);
    assert_eq!(graph.in_deps("/dep.js"), ["/origin.js"]);
  }

  #[test]
  fn duplicate_extracted_deps_are_collapsed() {
    let mut graph = fixed_graph(&["/dep.js", "/dep.js"]);
    graph.register("/origin.js", "");
    assert_eq!(graph.out_deps("/origin.js"), ["/dep.js"]);
  }

  #[test]
  fn reregistering_replaces_old_edges() {
    let mut graph = content_graph();

    graph.register("/foo.js", "/test.js");
    graph.register("/bar.js", "/test.js");
    assert_eq!(graph.in_deps("/test.js"), ["/foo.js", "/bar.js"]);

    graph.register("/foo.js", "/test2.js");
    assert_eq!(graph.in_deps("/test.js"), ["/bar.js"]);
    assert_eq!(graph.in_deps("/test2.js"), ["/foo.js"]);

    graph.register("/bar.js", "");
    assert!(graph.in_deps("/test.js").is_empty());
  }

  #[test]
  fn backward_closure_is_preorder() {
    let mut graph = content_graph();

    // a --> b -> d
    // c -^
    graph.register("/a.js", "/b.js");
    graph.register("/c.js", "/b.js");
    graph.register("/b.js", "/d.js");

    assert_eq!(graph.backward_closure("/d.js"), ["/b.js", "/a.js", "/c.js"]);
    assert_eq!(graph.forward_closure("/a.js"), ["/b.js", "/d.js"]);
  }

  #[test]
  fn closures_terminate_on_cycles() {
    let mut graph = content_graph();

    // a -> b -> c -> a
    graph.register("/a.js", "/b.js");
    graph.register("/b.js", "/c.js");
    graph.register("/c.js", "/a.js");

    assert_eq!(graph.backward_closure("/a.js"), ["/c.js", "/b.js"]);
    assert_eq!(graph.forward_closure("/a.js"), ["/b.js", "/c.js"]);
  }

  #[test]
  fn closure_of_unknown_file_is_empty() {
    let graph = content_graph();
    assert!(graph.backward_closure("/nope.js").is_empty());
    assert!(graph.out_deps("/nope.js").is_empty());
  }

  #[test]
  fn clear_unlinks_without_cascading() {
    let mut graph = content_graph();
    graph.register("/a.js", "/b.js");
    graph.register("/b.js", "/c.js");

    graph.clear("/b.js");

    assert!(!graph.contains("/b.js"));
    assert!(graph.in_deps("/c.js").is_empty());
    // Dependents of the cleared file keep their forward edge
    assert_eq!(graph.out_deps("/a.js"), ["/b.js"]);
  }

  #[test]
  fn deserialize_rebuilds_backward_edges() {
    let mut graph = content_graph();
    graph.register("/a.js", "/b.js");
    graph.register("/c.js", "/b.js");
    graph.register("/b.js", "/d.js");

    let serialized = graph.serialize();
    assert_eq!(serialized.len(), 3);
    assert!(!serialized.contains_key("/d.js"));

    let mut restored = content_graph();
    restored.deserialize(serialized);

    let mut in_b = restored.in_deps("/b.js").to_vec();
    in_b.sort();
    assert_eq!(in_b, ["/a.js", "/c.js"]);
    assert_eq!(restored.in_deps("/d.js"), ["/b.js"]);
    assert_eq!(restored.out_deps("/a.js"), ["/b.js"]);
  }
}
