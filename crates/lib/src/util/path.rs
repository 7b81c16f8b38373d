//! Path helpers shared by the graph, router and dev server.
//!
//! Identities are plain strings so they can key the cache and graph arenas and
//! round-trip through the cache file unchanged.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, resolving `.` and `..` without touching the filesystem.
///
/// Dependency references frequently point at files that do not exist yet, so
/// canonicalization is not an option here.
pub fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// The canonical identity string for a path.
pub fn identity(path: &Path) -> String {
  normalize(path).to_string_lossy().into_owned()
}

/// Lowercase extension without the leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
  path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Replace a trailing `.from` extension (case-insensitive) with `.to`.
///
/// Paths that do not end with `.from` are returned unchanged.
pub fn replace_extension(path: &str, from: &str, to: &str) -> String {
  let suffix_len = from.len() + 1;
  if path.len() < suffix_len || !path.is_char_boundary(path.len() - suffix_len) {
    return path.to_string();
  }
  let (stem, suffix) = path.split_at(path.len() - suffix_len);
  if suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(from) {
    format!("{}.{}", stem, to)
  } else {
    path.to_string()
  }
}

/// Path of `path` relative to `base` using forward slashes, if it lies beneath it.
pub fn relative_slash(path: &Path, base: &Path) -> Option<String> {
  let rel = path.strip_prefix(base).ok()?;
  let parts: Vec<String> = rel
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect();
  Some(parts.join("/"))
}

/// Whether any component of the path relative to `base` starts with a dot.
pub fn is_dotfile(path: &Path, base: &Path) -> bool {
  path
    .strip_prefix(base)
    .unwrap_or(path)
    .components()
    .any(|c| matches!(c, Component::Normal(name) if name.to_string_lossy().starts_with('.')))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_resolves_dots() {
    assert_eq!(normalize(Path::new("/a/b/../c/./d.js")), PathBuf::from("/a/c/d.js"));
    assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
  }

  #[test]
  fn replace_extension_is_case_insensitive() {
    assert_eq!(replace_extension("/src/app.ES6", "es6", "js"), "/src/app.js");
    assert_eq!(replace_extension("/src/app.scss", "es6", "js"), "/src/app.scss");
    assert_eq!(replace_extension("es6", "es6", "js"), "es6");
    assert_eq!(replace_extension("/src/fooes6", "es6", "js"), "/src/fooes6");
  }

  #[test]
  fn relative_slash_uses_forward_slashes() {
    let base = Path::new("/root/src");
    assert_eq!(
      relative_slash(Path::new("/root/src/vendor/a.es6"), base).as_deref(),
      Some("vendor/a.es6")
    );
    assert_eq!(relative_slash(Path::new("/elsewhere/a.es6"), base), None);
  }

  #[test]
  fn dotfiles_detected_in_any_component() {
    let base = Path::new("/site");
    assert!(is_dotfile(Path::new("/site/.git/config"), base));
    assert!(is_dotfile(Path::new("/site/css/.hidden.css"), base));
    assert!(!is_dotfile(Path::new("/site/css/main.css"), base));
  }
}
