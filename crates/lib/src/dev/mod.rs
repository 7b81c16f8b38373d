//! On-demand dev server.
//!
//! Each request is resolved back to its input file, checked against the
//! incremental gate and only rebuilt when the file or one of its dependencies
//! changed. Filesystem events update the dependency graph and are pushed to
//! browsers over a server-sent events stream; HTML responses carry a small
//! script that reloads the page on each event.
//!
//! # Submodules
//!
//! - [`coordinator`] - the task owning the gate
//! - [`http`] - request parsing and response writing
//! - [`middleware`] - request path to input resolution
//! - [`mime`] - content types

pub mod coordinator;
pub mod http;
pub mod middleware;
pub mod mime;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::consts::RELOAD_ENDPOINT;
use crate::pipeline::{Asset, Task, TaskError, run_single};
use crate::util::path::identity;
use crate::watch::FsEvent;

pub use coordinator::{DevCoordinator, DevHandle};
pub use http::{Request, Response};
pub use middleware::{Resolution, resolve};

#[derive(Debug, Error)]
pub enum DevError {
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Task(#[from] TaskError),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("dev coordinator stopped")]
  CoordinatorStopped,

  #[error("connection error: {0}")]
  Io(#[from] io::Error),
}

const RELOAD_CHANNEL_CAPACITY: usize = 16;

/// Serves built assets on demand. Cheap to clone; clones share the gate.
#[derive(Debug, Clone)]
pub struct DevServer {
  config: Arc<Config>,
  handle: DevHandle,
  reload: broadcast::Sender<String>,
}

impl DevServer {
  /// Start the gate coordinator for `config`. Must be called inside a tokio runtime.
  pub fn new(config: Config) -> Self {
    let (reload, _) = broadcast::channel(RELOAD_CHANNEL_CAPACITY);
    let (handle, _task) = DevCoordinator::new(config.new_gate(), reload.clone()).spawn();
    Self {
      config: Arc::new(config),
      handle,
      reload,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Subscribe to reload notifications (the changed file's identity).
  pub fn reloads(&self) -> broadcast::Receiver<String> {
    self.reload.subscribe()
  }

  /// Forward watcher events under the input root to the coordinator.
  pub fn forward_events(&self, mut events: mpsc::UnboundedReceiver<FsEvent>) {
    let server = self.clone();
    tokio::spawn(async move {
      while let Some(event) = events.recv().await {
        if !event.path.starts_with(&server.config.input) || event.path.starts_with(&server.config.output) {
          continue;
        }
        if server.config.is_excluded(&event.path) {
          trace!(path = %event.path.display(), "excluded change");
          continue;
        }
        if let Err(e) = server.handle.file_event(event).await {
          warn!(error = %e, "stopped forwarding file events");
          break;
        }
      }
    });
  }

  /// Accept connections until the listener fails.
  pub async fn serve(self, listener: TcpListener) {
    if let Ok(addr) = listener.local_addr() {
      info!(%addr, base_path = %self.config.dev.base_path, "dev server listening");
    }
    loop {
      match listener.accept().await {
        Ok((stream, peer)) => {
          let server = self.clone();
          tokio::spawn(async move {
            if let Err(e) = server.handle_connection(stream).await {
              debug!(%peer, error = %e, "connection ended with error");
            }
          });
        }
        Err(e) => warn!(error = %e, "failed to accept connection"),
      }
    }
  }

  async fn handle_connection(&self, stream: TcpStream) -> Result<(), DevError> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let request = match http::read_request(&mut reader).await {
      Ok(Some(request)) => request,
      Ok(None) => return Ok(()),
      Err(DevError::BadRequest(reason)) => {
        let response = Response::new(400, "text/plain; charset=utf-8", reason.clone());
        response.write_to(&mut write, false).await?;
        return Err(DevError::BadRequest(reason));
      }
      Err(e) => return Err(e),
    };

    if request.path == RELOAD_ENDPOINT {
      return self.stream_reloads(&mut write).await;
    }

    let response = self.respond(&request).await;
    debug!(method = %request.method, path = %request.path, status = response.status, "request");
    response.write_to(&mut write, request.is_head()).await
  }

  async fn stream_reloads<W: tokio::io::AsyncWrite + Unpin>(&self, write: &mut W) -> Result<(), DevError> {
    let mut reloads = self.reloads();
    write.write_all(http::EVENT_STREAM_HEAD.as_bytes()).await?;
    write.write_all(b": connected\n\n").await?;
    write.flush().await?;

    loop {
      match reloads.recv().await {
        Ok(path) => {
          write.write_all(http::event(&path).as_bytes()).await?;
          write.flush().await?;
        }
        Err(broadcast::error::RecvError::Lagged(_)) => continue,
        Err(broadcast::error::RecvError::Closed) => return Ok(()),
      }
    }
  }

  /// Build the response for `request`.
  pub async fn respond(&self, request: &Request) -> Response {
    if request.method != "GET" && request.method != "HEAD" {
      return Response::method_not_allowed();
    }

    match resolve(&self.config, &request.path, Path::exists) {
      Resolution::NotFound => Response::not_found(),
      Resolution::Redirect(location) => Response::redirect(&location),
      Resolution::Next(path) => self.serve_output(&path).await,
      Resolution::Transform {
        input,
        target,
        output,
        task,
      } => match self.transform(&input, &target, task).await {
        Ok(payload) => html_aware(&output, payload),
        Err(e) => {
          error!(path = %input.display(), error = %e, "transform failed");
          Response::error(&e.to_string())
        }
      },
    }
  }

  /// Serve `input` from the gate, rebuilding it as `target` when stale.
  async fn transform(&self, input: &Path, target: &Path, task: Arc<dyn Task>) -> Result<Vec<u8>, DevError> {
    let content = tokio::fs::read(input).await.map_err(|source| DevError::Read {
      path: input.to_path_buf(),
      source,
    })?;
    let id = identity(input);

    if let Some(payload) = self.handle.lookup(&id, content.clone()).await? {
      trace!(path = %id, "cache hit");
      return Ok(payload);
    }

    debug!(path = %id, task = task.name(), "building on request");
    let outputs = run_single(task, Asset::new(target, &self.config.input, content.clone())).await?;
    let payload = outputs.into_iter().next().map(|asset| asset.contents).unwrap_or_default();
    self.handle.store(&id, content, payload.clone()).await?;
    Ok(payload)
  }

  /// Fallback handler: files already present in the output directory.
  async fn serve_output(&self, path: &str) -> Response {
    let file = self.config.output.join(path.trim_start_matches('/'));
    match tokio::fs::read(&file).await {
      Ok(body) => html_aware(path, body),
      Err(_) => Response::not_found(),
    }
  }
}

fn html_aware(path: &str, body: Vec<u8>) -> Response {
  if mime::is_html(path) {
    Response::ok(mime::HTML, inject_reload(body))
  } else {
    Response::ok(mime::content_type(path), body)
  }
}

fn reload_script() -> String {
  format!(
    "<script>new EventSource(\"{}\").onmessage = function () {{ location.reload(); }};</script>",
    RELOAD_ENDPOINT
  )
}

/// Insert the reload client before the last `</body>`, or append it.
pub fn inject_reload(body: Vec<u8>) -> Vec<u8> {
  let script = reload_script();
  let lower = body.to_ascii_lowercase();
  let needle = b"</body>";
  let at = lower
    .windows(needle.len())
    .rposition(|window| window == needle)
    .unwrap_or(body.len());

  let mut out = Vec::with_capacity(body.len() + script.len());
  out.extend_from_slice(&body[..at]);
  out.extend_from_slice(script.as_bytes());
  out.extend_from_slice(&body[at..]);
  out
}
