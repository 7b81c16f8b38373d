//! Single owner of the dev server's gate.
//!
//! Requests and file events reach the gate only as messages to one task, so
//! cache and graph are never shared or locked. Transforms run outside the
//! coordinator; it only answers lookups and commits results.
//!
//! Answering a message reads dependencies from disk, so the loop runs on a
//! blocking thread and receives with `blocking_recv`.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::DevError;
use crate::cache::{FsLoader, IncrementalGate};
use crate::watch::{FsEvent, WatchCoordinator, WatchEventKind};

const MAILBOX_CAPACITY: usize = 64;

enum Message {
  Lookup {
    id: String,
    content: Vec<u8>,
    reply: oneshot::Sender<Option<Vec<u8>>>,
  },
  Store {
    id: String,
    content: Vec<u8>,
    payload: Vec<u8>,
    reply: oneshot::Sender<()>,
  },
  FileEvent {
    event: FsEvent,
    reply: oneshot::Sender<Vec<String>>,
  },
}

/// Cloneable handle for talking to the coordinator.
#[derive(Debug, Clone)]
pub struct DevHandle {
  tx: mpsc::Sender<Message>,
}

impl std::fmt::Debug for Message {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Message::Lookup { id, .. } => f.debug_struct("Lookup").field("id", id).finish(),
      Message::Store { id, .. } => f.debug_struct("Store").field("id", id).finish(),
      Message::FileEvent { event, .. } => f.debug_struct("FileEvent").field("event", event).finish(),
    }
  }
}

impl DevHandle {
  /// The stored payload for `id`, when `content` and its dependencies are
  /// unchanged and a payload was recorded.
  pub async fn lookup(&self, id: &str, content: Vec<u8>) -> Result<Option<Vec<u8>>, DevError> {
    let (reply, rx) = oneshot::channel();
    self.send(Message::Lookup {
      id: id.to_string(),
      content,
      reply,
    })
    .await?;
    rx.await.map_err(|_| DevError::CoordinatorStopped)
  }

  /// Commit `id` with its freshly built `payload`.
  pub async fn store(&self, id: &str, content: Vec<u8>, payload: Vec<u8>) -> Result<(), DevError> {
    let (reply, rx) = oneshot::channel();
    self.send(Message::Store {
      id: id.to_string(),
      content,
      payload,
      reply,
    })
    .await?;
    rx.await.map_err(|_| DevError::CoordinatorStopped)
  }

  /// Feed a filesystem event through the graph. Returns the files to reload.
  pub async fn file_event(&self, event: FsEvent) -> Result<Vec<String>, DevError> {
    let (reply, rx) = oneshot::channel();
    self.send(Message::FileEvent { event, reply }).await?;
    rx.await.map_err(|_| DevError::CoordinatorStopped)
  }

  async fn send(&self, message: Message) -> Result<(), DevError> {
    self.tx.send(message).await.map_err(|_| DevError::CoordinatorStopped)
  }
}

pub struct DevCoordinator {
  gate: IncrementalGate,
  reload: broadcast::Sender<String>,
}

impl DevCoordinator {
  pub fn new(gate: IncrementalGate, reload: broadcast::Sender<String>) -> Self {
    Self { gate, reload }
  }

  /// Start the coordinator on a blocking thread. It stops once every handle
  /// is dropped and hands the gate back.
  pub fn spawn(self) -> (DevHandle, JoinHandle<IncrementalGate>) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let task = tokio::task::spawn_blocking(move || self.run(rx));
    (DevHandle { tx }, task)
  }

  fn run(mut self, mut rx: mpsc::Receiver<Message>) -> IncrementalGate {
    while let Some(message) = rx.blocking_recv() {
      trace!(?message, "coordinator message");
      match message {
        Message::Lookup { id, content, reply } => {
          let _ = reply.send(self.lookup(&id, &content));
        }
        Message::Store {
          id,
          content,
          payload,
          reply,
        } => {
          self.gate.register(&id, &content, Some(payload), &mut FsLoader);
          let _ = reply.send(());
        }
        Message::FileEvent { event, reply } => {
          let _ = reply.send(self.file_event(event));
        }
      }
    }
    debug!("dev coordinator stopped");
    self.gate
  }

  fn lookup(&self, id: &str, content: &[u8]) -> Option<Vec<u8>> {
    if !self.gate.test(id, content, &mut FsLoader) {
      return None;
    }
    // a hit without a payload was only ever committed as a dependency
    self.gate.get(id).map(<[u8]>::to_vec)
  }

  fn file_event(&mut self, event: FsEvent) -> Vec<String> {
    let mut reloaded = Vec::new();
    {
      let reload = &self.reload;
      let mut coordinator = WatchCoordinator::new(|kind: WatchEventKind, dirty: Vec<String>, origin: &str| {
        debug!(kind = kind.as_str(), path = %origin, dependents = dirty.len() - 1, "file changed");
        // no subscribers is fine
        let _ = reload.send(origin.to_string());
        reloaded = dirty;
      });
      coordinator.handle(self.gate.graph_mut(), event.kind, &event.path, &mut FsLoader);
    }
    reloaded
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;
  use std::sync::Arc;

  use tempfile::TempDir;

  use super::*;
  use crate::cache::{ContentCache, Signer};
  use crate::graph::{DepScanner, DependencyGraph, ScannerSet};
  use crate::util::path::identity;

  fn gate(root: &Path) -> IncrementalGate {
    let mut scanners = ScannerSet::new();
    scanners.insert(DepScanner::new("css", &[r#"@import "([^"]+)""#.to_string()], Some(root.to_path_buf())).unwrap());
    IncrementalGate::new(ContentCache::new(Signer::Raw), DependencyGraph::new(Arc::new(scanners)))
  }

  #[tokio::test]
  async fn lookup_hits_only_after_store() {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    let (reload, _) = broadcast::channel(8);
    let (handle, task) = DevCoordinator::new(gate(&root), reload).spawn();

    let id = identity(&root.join("a.css"));
    assert_eq!(handle.lookup(&id, b"a".to_vec()).await.unwrap(), None);

    handle.store(&id, b"a".to_vec(), b"built".to_vec()).await.unwrap();
    assert_eq!(handle.lookup(&id, b"a".to_vec()).await.unwrap(), Some(b"built".to_vec()));
    assert_eq!(handle.lookup(&id, b"b".to_vec()).await.unwrap(), None);

    drop(handle);
    let gate = task.await.unwrap();
    assert!(gate.cache().contains(&id));
  }

  #[tokio::test]
  async fn file_event_reloads_dependents() {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    fs::write(root.join("main.css"), "@import \"./base.css\"").unwrap();
    fs::write(root.join("base.css"), "body {}").unwrap();

    let (reload, mut reloads) = broadcast::channel(8);
    let (handle, _task) = DevCoordinator::new(gate(&root), reload).spawn();

    let main = identity(&root.join("main.css"));
    let content = fs::read(root.join("main.css")).unwrap();
    handle.store(&main, content, b"built".to_vec()).await.unwrap();

    let dirty = handle
      .file_event(FsEvent {
        kind: WatchEventKind::Change,
        path: root.join("base.css"),
      })
      .await
      .unwrap();

    assert_eq!(dirty, [identity(&root.join("base.css")), main]);
    assert_eq!(reloads.recv().await.unwrap(), identity(&root.join("base.css")));
  }

  #[tokio::test]
  async fn remove_events_reload_nothing() {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    let (reload, _) = broadcast::channel(8);
    let (handle, _task) = DevCoordinator::new(gate(&root), reload).spawn();

    let dirty = handle
      .file_event(FsEvent {
        kind: WatchEventKind::Remove,
        path: root.join("gone.css"),
      })
      .await
      .unwrap();
    assert!(dirty.is_empty());
  }
}
