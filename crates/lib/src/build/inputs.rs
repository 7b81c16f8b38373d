//! Input enumeration for full builds.

use std::path::PathBuf;

use globset::Glob;
use tracing::trace;
use walkdir::WalkDir;

use super::BuildError;
use crate::config::Config;
use crate::util::path::{is_dotfile, relative_slash};

/// Which files under the input root take part in a build.
#[derive(Debug, Clone, Default)]
pub struct InputOptions {
  /// Include files and directories whose name starts with a dot.
  pub dot: bool,
  /// Only build files matching this glob, relative to the input root.
  pub filter: Option<String>,
}

/// Every regular file under the config's input root, sorted by path.
///
/// Dotfiles are skipped unless requested, as are files matching the config's
/// top-level excludes and anything inside the output directory.
pub fn collect_inputs(config: &Config, options: &InputOptions) -> Result<Vec<PathBuf>, BuildError> {
  let filter = options
    .filter
    .as_deref()
    .map(|pattern| {
      Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|source| BuildError::InvalidFilter {
          pattern: pattern.to_string(),
          source,
        })
    })
    .transpose()?;

  let root = &config.input;
  let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|entry| {
    let path = entry.path();
    (options.dot || !is_dotfile(path, root)) && !path.starts_with(&config.output)
  });

  let mut inputs = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|source| BuildError::Walk {
      path: root.to_path_buf(),
      source,
    })?;
    if !entry.file_type().is_file() {
      continue;
    }

    let path = entry.path();
    if config.is_excluded(path) {
      trace!(path = %path.display(), "excluded input");
      continue;
    }
    if let Some(filter) = &filter {
      let rel = relative_slash(path, root).unwrap_or_default();
      if !filter.is_match(&rel) {
        continue;
      }
    }
    inputs.push(path.to_path_buf());
  }

  Ok(inputs)
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::config::load_config_from_str;
  use crate::mode::BuildMode;
  use crate::util::testutil::write_tree;

  fn setup(extra: &str) -> (TempDir, Config) {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    write_tree(
      &root,
      &[
        ("src/index.html", ""),
        ("src/js/app.es6", ""),
        ("src/js/app.bak", ""),
        ("src/.hidden/secret.txt", ""),
        ("src/.env", ""),
      ],
    );
    let config = load_config_from_str(extra, &root, BuildMode::Dev).unwrap();
    (temp, config)
  }

  fn relative(config: &Config, inputs: &[PathBuf]) -> Vec<String> {
    inputs.iter().map(|p| relative_slash(p, &config.input).unwrap()).collect()
  }

  #[test]
  fn skips_dotfiles_by_default() {
    let (_temp, config) = setup("");
    let inputs = collect_inputs(&config, &InputOptions::default()).unwrap();
    assert_eq!(relative(&config, &inputs), ["index.html", "js/app.bak", "js/app.es6"]);
  }

  #[test]
  fn includes_dotfiles_when_asked() {
    let (_temp, config) = setup("");
    let options = InputOptions {
      dot: true,
      filter: None,
    };
    let inputs = collect_inputs(&config, &options).unwrap();
    assert_eq!(inputs.len(), 5);
  }

  #[test]
  fn applies_filter_and_top_level_excludes() {
    let (_temp, config) = setup("exclude = \"**/*.bak\"\n");
    let options = InputOptions {
      dot: false,
      filter: Some("js/**".to_string()),
    };
    let inputs = collect_inputs(&config, &options).unwrap();
    assert_eq!(relative(&config, &inputs), ["js/app.es6"]);
  }

  #[test]
  fn skips_output_directory_inside_input() {
    let (_temp, config) = setup("output = \"src/dist\"\n");
    write_tree(&config.input, &[("dist/index.html", "built")]);

    let inputs = collect_inputs(&config, &InputOptions::default()).unwrap();
    assert!(!relative(&config, &inputs).iter().any(|p| p.starts_with("dist/")));
  }

  #[test]
  fn invalid_filter_errors() {
    let (_temp, config) = setup("");
    let options = InputOptions {
      dot: false,
      filter: Some("a/{b".to_string()),
    };
    assert!(matches!(
      collect_inputs(&config, &options),
      Err(BuildError::InvalidFilter { .. })
    ));
  }
}
