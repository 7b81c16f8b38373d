//! Transform tasks.
//!
//! A [`Task`] turns a stream of assets into a stream of results. Output order
//! follows input order; one input may yield any number of outputs. The first
//! failure is forwarded as an `Err` item and ends the stream.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::asset::Asset;
use crate::consts::{LANE_CAPACITY, MODE_ENV};
use crate::mode::BuildMode;

#[derive(Debug, Error)]
pub enum TaskError {
  #[error("task '{task}' could not run `{command}`: {source}")]
  Spawn {
    task: String,
    command: String,
    #[source]
    source: io::Error,
  },

  #[error("task '{task}' failed on {} (exit code {code:?}): {stderr}", path.display())]
  Failed {
    task: String,
    path: PathBuf,
    code: Option<i32>,
    stderr: String,
  },

  #[error("task '{task}' failed on {}: {message}", path.display())]
  Transform {
    task: String,
    path: PathBuf,
    message: String,
  },
}

pub type TaskResult = Result<Asset, TaskError>;

pub trait Task: Send + Sync + fmt::Debug {
  fn name(&self) -> &str;

  /// Spawn the transform over `input` and return its output stream.
  fn pipe(self: Arc<Self>, input: mpsc::Receiver<Asset>) -> mpsc::Receiver<TaskResult>;
}

/// Drive `transform` over every asset of `input` in order, on a new tokio task.
pub fn spawn_each<F, Fut>(mut input: mpsc::Receiver<Asset>, mut transform: F) -> mpsc::Receiver<TaskResult>
where
  F: FnMut(Asset) -> Fut + Send + 'static,
  Fut: Future<Output = Result<Vec<Asset>, TaskError>> + Send + 'static,
{
  let (tx, rx) = mpsc::channel(LANE_CAPACITY);
  tokio::spawn(async move {
    while let Some(asset) = input.recv().await {
      match transform(asset).await {
        Ok(outputs) => {
          for output in outputs {
            if tx.send(Ok(output)).await.is_err() {
              return;
            }
          }
        }
        Err(e) => {
          let _ = tx.send(Err(e)).await;
          return;
        }
      }
    }
  });
  rx
}

/// Run `task` over a single asset and collect everything it produces.
pub async fn run_single(task: Arc<dyn Task>, asset: Asset) -> Result<Vec<Asset>, TaskError> {
  let (tx, rx) = mpsc::channel(1);
  // capacity 1 and a fresh channel: the send cannot fail or wait
  let _ = tx.send(asset).await;
  drop(tx);

  let mut output = task.pipe(rx);
  let mut assets = Vec::new();
  while let Some(result) = output.recv().await {
    assets.push(result?);
  }
  Ok(assets)
}

/// Passes every asset through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTask;

impl Task for IdentityTask {
  fn name(&self) -> &str {
    "identity"
  }

  fn pipe(self: Arc<Self>, input: mpsc::Receiver<Asset>) -> mpsc::Receiver<TaskResult> {
    spawn_each(input, |asset| async move { Ok(vec![asset]) })
  }
}

type TransformFn = dyn Fn(Asset) -> Result<Vec<Asset>, TaskError> + Send + Sync;

/// A synchronous in-process transform.
pub struct FnTask {
  name: String,
  transform: Arc<TransformFn>,
}

impl FnTask {
  pub fn new<F>(name: &str, transform: F) -> Self
  where
    F: Fn(Asset) -> Result<Vec<Asset>, TaskError> + Send + Sync + 'static,
  {
    Self {
      name: name.to_string(),
      transform: Arc::new(transform),
    }
  }

  /// One output per input, contents rewritten by `f`.
  pub fn map_contents<F>(name: &str, f: F) -> Self
  where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
  {
    Self::new(name, move |mut asset| {
      asset.contents = f(&asset.contents);
      Ok(vec![asset])
    })
  }
}

impl fmt::Debug for FnTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnTask").field("name", &self.name).finish()
  }
}

impl Task for FnTask {
  fn name(&self) -> &str {
    &self.name
  }

  fn pipe(self: Arc<Self>, input: mpsc::Receiver<Asset>) -> mpsc::Receiver<TaskResult> {
    let transform = self.transform.clone();
    spawn_each(input, move |asset| std::future::ready(transform(asset)))
  }
}

/// Runs a shell command per asset: contents on stdin, stdout becomes the new contents.
#[derive(Debug, Clone)]
pub struct CommandTask {
  name: String,
  command: String,
  env: BTreeMap<String, String>,
  cwd: Option<PathBuf>,
  only: Option<BuildMode>,
  mode: BuildMode,
}

impl CommandTask {
  pub fn new(name: &str, command: &str) -> Self {
    Self {
      name: name.to_string(),
      command: command.to_string(),
      env: BTreeMap::new(),
      cwd: None,
      only: None,
      mode: BuildMode::default(),
    }
  }

  pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
    self.env = env;
    self
  }

  pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
    self.cwd = Some(cwd);
    self
  }

  /// Restrict the task to one build mode; it passes assets through in the other.
  pub fn only_in(mut self, mode: Option<BuildMode>) -> Self {
    self.only = mode;
    self
  }

  pub fn with_mode(mut self, mode: BuildMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn is_active(&self) -> bool {
    self.only.is_none_or(|only| only == self.mode)
  }

  pub async fn run(&self, mut asset: Asset) -> Result<Asset, TaskError> {
    let (shell, shell_args) = shell();
    let mut command = Command::new(shell);
    command
      .args(shell_args)
      .arg(&self.command)
      .env(MODE_ENV, self.mode.env_value())
      .env("KILN_FILE", &asset.path)
      .envs(&self.env)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    if let Some(cwd) = &self.cwd {
      command.current_dir(cwd);
    }

    trace!(task = %self.name, path = %asset.path.display(), "spawning command");
    let mut child = command.spawn().map_err(|source| TaskError::Spawn {
      task: self.name.clone(),
      command: self.command.clone(),
      source,
    })?;

    // feed stdin concurrently so a command that writes before reading cannot deadlock
    if let Some(mut stdin) = child.stdin.take() {
      let contents = std::mem::take(&mut asset.contents);
      tokio::spawn(async move {
        if let Err(e) = stdin.write_all(&contents).await {
          debug!(error = %e, "command closed stdin early");
        }
      });
    }

    let output = child.wait_with_output().await.map_err(|source| TaskError::Spawn {
      task: self.name.clone(),
      command: self.command.clone(),
      source,
    })?;

    if !output.status.success() {
      return Err(TaskError::Failed {
        task: self.name.clone(),
        path: asset.path,
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    asset.contents = output.stdout;
    Ok(asset)
  }
}

impl Task for CommandTask {
  fn name(&self) -> &str {
    &self.name
  }

  fn pipe(self: Arc<Self>, input: mpsc::Receiver<Asset>) -> mpsc::Receiver<TaskResult> {
    if !self.is_active() {
      debug!(task = %self.name, mode = %self.mode, "task inactive in this mode");
      return Arc::new(IdentityTask).pipe(input);
    }
    spawn_each(input, move |asset| {
      let task = self.clone();
      async move { task.run(asset).await.map(|asset| vec![asset]) }
    })
  }
}

#[cfg(unix)]
fn shell() -> (&'static str, &'static [&'static str]) {
  ("/bin/sh", &["-c"])
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static [&'static str]) {
  ("cmd.exe", &["/C"])
}
