use std::path::PathBuf;

use crate::util::path::{relative_slash, replace_extension};

/// A file flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
  /// Absolute path. Tasks may rewrite it; the router rewrites the extension.
  pub path: PathBuf,
  /// Input root the asset was read from.
  pub base: PathBuf,
  pub contents: Vec<u8>,
}

impl Asset {
  pub fn new(path: impl Into<PathBuf>, base: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
    Self {
      path: path.into(),
      base: base.into(),
      contents: contents.into(),
    }
  }

  /// Path relative to the input root, falling back to the file name.
  pub fn relative(&self) -> PathBuf {
    match self.path.strip_prefix(&self.base) {
      Ok(rel) => rel.to_path_buf(),
      Err(_) => self.path.file_name().map(PathBuf::from).unwrap_or_default(),
    }
  }

  /// Forward-slash relative path, used for glob matching.
  pub fn relative_slash(&self) -> String {
    relative_slash(&self.path, &self.base).unwrap_or_else(|| self.path.to_string_lossy().into_owned())
  }

  /// Rewrite a trailing `.from` extension to `.to`, case-insensitively.
  pub fn rewrite_extension(&mut self, from: &str, to: &str) {
    let rewritten = replace_extension(&self.path.to_string_lossy(), from, to);
    self.path = PathBuf::from(rewritten);
  }
}
