//! Batch-scoped change detection.
//!
//! A [`ChangeFilter`] sits in front of the router and admits only files whose
//! own content, or a direct dependency's content, differs from the cache.
//! Nothing is written to the gate while the batch runs: every file seen is
//! recorded in a [`PendingBatch`], which is committed once the batch completes.
//! Decisions for later files in a batch are therefore never influenced by
//! commits made on behalf of earlier ones.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::cache::{ContentLoader, IncrementalGate};

/// Contents seen during one batch, keyed by identity.
///
/// Doubles as the batch's content loader: lookups hit the recorded contents
/// first and fall back to `fallback`, memoising the answer (including misses).
#[derive(Debug)]
pub struct PendingBatch<L> {
  fallback: L,
  contents: HashMap<String, Option<Vec<u8>>>,
  /// Files fed through the filter, in first-seen order.
  roots: Vec<String>,
  seen: HashSet<String>,
}

impl<L: ContentLoader> PendingBatch<L> {
  pub fn new(fallback: L) -> Self {
    Self {
      fallback,
      contents: HashMap::new(),
      roots: Vec::new(),
      seen: HashSet::new(),
    }
  }

  fn record(&mut self, id: &str, content: &[u8]) {
    self.contents.insert(id.to_string(), Some(content.to_vec()));
    if self.seen.insert(id.to_string()) {
      self.roots.push(id.to_string());
    }
  }

  /// Register every recorded file, and its stale dependency subtree, with `gate`.
  pub fn commit(mut self, gate: &mut IncrementalGate) {
    let roots = std::mem::take(&mut self.roots);
    for id in &roots {
      let Some(Some(content)) = self.contents.get(id).cloned() else {
        continue;
      };
      gate.register(id, &content, None, &mut self);
    }
    trace!(files = roots.len(), "committed batch");
  }
}

impl<L: ContentLoader> ContentLoader for PendingBatch<L> {
  fn load(&mut self, id: &str) -> Option<Vec<u8>> {
    if let Some(content) = self.contents.get(id) {
      return content.clone();
    }
    let content = self.fallback.load(id);
    self.contents.insert(id.to_string(), content.clone());
    content
  }
}

/// Admits files that need rebuilding, deferring all cache writes.
pub struct ChangeFilter<'a, L> {
  gate: &'a IncrementalGate,
  batch: PendingBatch<L>,
}

impl<'a, L: ContentLoader> ChangeFilter<'a, L> {
  pub fn new(gate: &'a IncrementalGate, fallback: L) -> Self {
    Self {
      gate,
      batch: PendingBatch::new(fallback),
    }
  }

  /// Record `id` with `content` and report whether it must be rebuilt.
  pub fn admit(&mut self, id: &str, content: &[u8]) -> bool {
    self.batch.record(id, content);
    let hit = self.gate.test(id, content, &mut self.batch);
    trace!(id, hit, "change filter");
    !hit
  }

  /// End the batch, handing back the recorded contents for a later commit.
  pub fn finish(self) -> PendingBatch<L> {
    self.batch
  }
}
