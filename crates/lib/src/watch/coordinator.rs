//! Filesystem change to dirty-set mapping.

use std::path::Path;

use tracing::{debug, trace};

use crate::cache::ContentLoader;
use crate::cache::gate::as_text;
use crate::graph::DependencyGraph;
use crate::util::path::identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
  Add,
  Change,
  Remove,
}

impl WatchEventKind {
  pub fn as_str(self) -> &'static str {
    match self {
      WatchEventKind::Add => "add",
      WatchEventKind::Change => "change",
      WatchEventKind::Remove => "remove",
    }
  }
}

/// Turns change notifications into the set of files that must be rebuilt.
///
/// Each `add`/`change` re-registers the file in the graph from its current
/// content, then reports the file together with everything that depends on it,
/// directly or transitively. No debouncing happens here.
pub struct WatchCoordinator<F> {
  callback: F,
}

impl<F> WatchCoordinator<F>
where
  F: FnMut(WatchEventKind, Vec<String>, &str),
{
  pub fn new(callback: F) -> Self {
    Self { callback }
  }

  pub fn handle(
    &mut self,
    graph: &mut DependencyGraph,
    kind: WatchEventKind,
    path: &Path,
    loader: &mut impl ContentLoader,
  ) {
    if kind == WatchEventKind::Remove {
      trace!(path = %path.display(), "ignoring remove");
      return;
    }

    let id = identity(path);
    let dependents = match loader.load(&id) {
      Some(content) => {
        graph.register(&id, &as_text(&content));
        graph.backward_closure(&id)
      }
      None => {
        // dependents still need a rebuild so the missing file gets reported
        let dependents = graph.backward_closure(&id);
        debug!(path = %id, "changed file unreadable, clearing");
        graph.clear(&id);
        dependents
      }
    };

    let mut dirty = Vec::with_capacity(dependents.len() + 1);
    dirty.push(id.clone());
    dirty.extend(dependents);
    (self.callback)(kind, dirty, &id);
  }
}
