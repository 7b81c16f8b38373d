//! Bridge from `notify` to tokio, with burst coalescing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::WatchError;
use super::coordinator::WatchEventKind;

/// A single filesystem notification for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
  pub kind: WatchEventKind,
  pub path: PathBuf,
}

/// Keeps the underlying watcher alive; dropping it stops notifications.
pub struct FsWatcher {
  _watcher: RecommendedWatcher,
}

/// Start watching `root` recursively. Events arrive on the returned receiver.
pub fn watch_dir(root: &Path) -> Result<(FsWatcher, mpsc::UnboundedReceiver<FsEvent>), WatchError> {
  let (tx, rx) = mpsc::unbounded_channel();

  let mut watcher = RecommendedWatcher::new(
    move |res: Result<Event, notify::Error>| match res {
      Ok(event) => {
        for event in classify(&event) {
          let _ = tx.send(event);
        }
      }
      Err(e) => warn!(error = %e, "watch error"),
    },
    Config::default(),
  )?;
  watcher.watch(root, RecursiveMode::Recursive)?;

  trace!(root = %root.display(), "watching");
  Ok((FsWatcher { _watcher: watcher }, rx))
}

/// Map a raw notify event to per-file events. Directories and access events are dropped.
pub fn classify(event: &Event) -> Vec<FsEvent> {
  let kind = match event.kind {
    EventKind::Create(_) => WatchEventKind::Add,
    EventKind::Modify(ModifyKind::Name(_)) => {
      // renames report both ends; whichever still exists was added
      return event
        .paths
        .iter()
        .map(|path| FsEvent {
          kind: if path.exists() {
            WatchEventKind::Add
          } else {
            WatchEventKind::Remove
          },
          path: path.clone(),
        })
        .filter(|e| !e.path.is_dir())
        .collect();
    }
    EventKind::Modify(_) => WatchEventKind::Change,
    EventKind::Remove(_) => WatchEventKind::Remove,
    _ => return Vec::new(),
  };

  event
    .paths
    .iter()
    .filter(|path| !path.is_dir())
    .map(|path| FsEvent {
      kind,
      path: path.clone(),
    })
    .collect()
}

/// Pending changes waiting for a quiet window, one entry per path.
#[derive(Debug, Default)]
pub struct PendingChanges {
  order: Vec<PathBuf>,
  kinds: HashMap<PathBuf, WatchEventKind>,
}

impl PendingChanges {
  pub fn add(&mut self, event: FsEvent) {
    match self.kinds.get_mut(&event.path) {
      // a file created during the window stays an add
      Some(existing) if *existing == WatchEventKind::Add && event.kind == WatchEventKind::Change => {}
      Some(existing) => *existing = event.kind,
      None => {
        self.order.push(event.path.clone());
        self.kinds.insert(event.path, event.kind);
      }
    }
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn take(&mut self) -> Vec<FsEvent> {
    let kinds = std::mem::take(&mut self.kinds);
    std::mem::take(&mut self.order)
      .into_iter()
      .filter_map(|path| kinds.get(&path).map(|&kind| FsEvent { kind, path }))
      .collect()
  }
}

/// Wait for the next burst of events and return it once `quiet` passes without new ones.
///
/// `None` when the channel is closed and nothing is pending.
pub async fn next_burst(rx: &mut mpsc::UnboundedReceiver<FsEvent>, quiet: Duration) -> Option<Vec<FsEvent>> {
  let mut pending = PendingChanges::default();
  pending.add(rx.recv().await?);

  loop {
    match tokio::time::timeout(quiet, rx.recv()).await {
      Ok(Some(event)) => pending.add(event),
      Ok(None) | Err(_) => break,
    }
  }
  Some(pending.take())
}
