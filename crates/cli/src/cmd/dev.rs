//! Implementation of the `kiln dev` command.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use kiln_lib::config::load::normalize_base_path;
use kiln_lib::dev::DevServer;
use kiln_lib::mode::BuildMode;
use kiln_lib::watch::{WatchEventKind, watch_dir};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use super::load;
use crate::output::{print_change, print_info, print_success};

/// Serve the input directory, building each request on demand and pushing
/// reloads to connected browsers when inputs change.
pub fn cmd_dev(config_path: &Path, mode: BuildMode, port: Option<u16>, base_path: Option<&str>) -> Result<()> {
  let mut config = load(config_path, mode)?;
  if let Some(port) = port {
    config.dev.port = port;
  }
  if let Some(base_path) = base_path {
    config.dev.base_path = normalize_base_path(base_path).context("Invalid --base-path")?;
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async move {
    let addr = SocketAddr::from(([127, 0, 0, 1], config.dev.port));
    let listener = TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to listen on {}", addr))?;
    let url = format!("http://{}{}", addr, config.dev.base_path);

    let root = config.root.clone();
    let input = config.input.clone();
    let (_watcher, events) =
      watch_dir(&input).with_context(|| format!("Failed to watch {}", input.display()))?;

    let server = DevServer::new(config);
    server.forward_events(events);

    let mut reloads = server.reloads();
    tokio::spawn(async move {
      loop {
        match reloads.recv().await {
          Ok(path) => print_change(WatchEventKind::Change, Path::new(&path), &root),
          Err(RecvError::Lagged(_)) => continue,
          Err(RecvError::Closed) => break,
        }
      }
    });

    print_success(&format!("Serving {} at {}", input.display(), url));
    tokio::select! {
      _ = server.serve(listener) => {}
      _ = tokio::signal::ctrl_c() => print_info("Stopped dev server"),
    }
    Ok::<_, anyhow::Error>(())
  })
}
