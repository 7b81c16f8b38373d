//! Config file loading and resolution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use super::types::{RawConfig, RawRule, RawTask};
use super::{Config, ConfigError, DevConfig};
use crate::consts::{CACHE_FILENAME, DEFAULT_DEV_PORT};
use crate::graph::{DepScanner, ScannerSet};
use crate::mode::BuildMode;
use crate::pipeline::{CommandTask, Task};
use crate::rule::{Rule, RuleSet};
use crate::util::path::normalize;

/// Load and resolve the config file at `path`.
pub fn load_config(path: &Path, mode: BuildMode) -> Result<Config, ConfigError> {
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  let dir = path.parent().unwrap_or(Path::new("."));
  let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
  let root = dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());

  debug!(path = %path.display(), root = %root.display(), "loading config");
  load_config_from_str(&content, &root, mode)
}

/// Parse and resolve config text, with relative paths resolved against `root`.
pub fn load_config_from_str(content: &str, root: &Path, mode: BuildMode) -> Result<Config, ConfigError> {
  let raw: RawConfig = toml::from_str(content)?;
  resolve(raw, root, mode)
}

fn resolve(raw: RawConfig, root: &Path, mode: BuildMode) -> Result<Config, ConfigError> {
  let resolve_path = |p: &str| normalize(&root.join(p));

  let input = resolve_path(&raw.input);
  let output = resolve_path(&raw.output);
  let cache_file = resolve_path(raw.cache.as_deref().unwrap_or(CACHE_FILENAME));

  let exclude = build_globset(&raw.exclude.clone().into_vec()).map_err(|source| ConfigError::InvalidGlob {
    rule: "exclude".to_string(),
    source,
  })?;

  let mut rules = RuleSet::new();
  let mut scanners = ScannerSet::new();

  for (ext, raw_rule) in raw.rules {
    let ext = ext.to_lowercase();
    let table = match raw_rule {
      RawRule::Task(task) => super::types::RawRuleTable {
        task,
        output_ext: None,
        exclude: Default::default(),
        deps: None,
      },
      RawRule::Table(table) => table,
    };

    let raw_task = raw.tasks.get(&table.task).ok_or_else(|| ConfigError::UndefinedTask {
      rule: ext.clone(),
      task: table.task.clone(),
    })?;
    let task = build_task(&table.task, raw_task, root, mode);

    let output_ext = table.output_ext.as_deref().unwrap_or(&ext).to_string();
    let rule = Rule::new(&ext, &output_ext, task)
      .with_exclude(&table.exclude.into_vec())
      .map_err(|source| ConfigError::InvalidGlob {
        rule: ext.clone(),
        source,
      })?;
    rules.insert(rule);

    if let Some(deps) = table.deps {
      let deps_root = deps.root.as_deref().map(resolve_path).unwrap_or_else(|| input.clone());
      let scanner = DepScanner::new(&ext, &deps.patterns, Some(deps_root)).map_err(|source| {
        ConfigError::InvalidPattern {
          rule: ext.clone(),
          source,
        }
      })?;
      scanners.insert(scanner);
    }
  }

  let dev = DevConfig {
    port: raw.dev.port.unwrap_or(DEFAULT_DEV_PORT),
    base_path: normalize_base_path(raw.dev.base_path.as_deref().unwrap_or("/"))?,
  };

  debug!(rules = rules.len(), input = %input.display(), output = %output.display(), "config resolved");

  Ok(Config {
    root: root.to_path_buf(),
    input,
    output,
    cache_file,
    signer: raw.signer,
    mode,
    rules: Arc::new(rules),
    scanners: Arc::new(scanners),
    dev,
    exclude,
  })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    builder.add(Glob::new(pattern)?);
  }
  builder.build()
}

fn build_task(name: &str, raw: &RawTask, root: &Path, mode: BuildMode) -> Arc<dyn Task> {
  let cwd: PathBuf = raw.cwd.as_deref().map(|c| normalize(&root.join(c))).unwrap_or_else(|| root.to_path_buf());
  Arc::new(
    CommandTask::new(name, &raw.command)
      .with_env(raw.env.clone())
      .with_cwd(cwd)
      .only_in(raw.mode)
      .with_mode(mode),
  )
}

/// `docs` and `/docs` both become `/docs/`.
pub fn normalize_base_path(base: &str) -> Result<String, ConfigError> {
  let trimmed = base.trim();
  if trimmed.contains("://") {
    return Err(ConfigError::InvalidBasePath(base.to_string()));
  }
  let inner = trimmed.trim_matches('/');
  if inner.is_empty() {
    Ok("/".to_string())
  } else {
    Ok(format!("/{}/", inner))
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::cache::Signer;
  use crate::graph::DependencyExtractor;

  fn load(toml: &str) -> Result<Config, ConfigError> {
    load_config_from_str(toml, Path::new("/project"), BuildMode::Dev)
  }

  #[test]
  fn parse_minimal_config() {
    let config = load("").unwrap();
    assert_eq!(config.input, PathBuf::from("/project/src"));
    assert_eq!(config.output, PathBuf::from("/project/dist"));
    assert_eq!(config.cache_file, PathBuf::from("/project/.kiln-cache.json"));
    assert_eq!(config.signer, Signer::Raw);
    assert_eq!(config.dev.port, 3000);
    assert_eq!(config.dev.base_path, "/");
    assert!(config.rules.is_empty());
  }

  #[test]
  fn parse_full_config() {
    let config = load(
      r#"
input = "site"
output = "public"
cache = "tmp/cache.json"
signer = "sha256"
exclude = ["**/*.bak"]

[tasks.es]
command = "esbuild"
env = { NODE_ENV = "production" }

[tasks.sass]
command = "sass --stdin"
mode = "prod"

[rules.es6]
task = "es"
output_ext = "js"
exclude = "**/vendor/**"

[rules.es6.deps]
patterns = ['import\s+"([^"]+)"']

[rules.SCSS]
task = "sass"
output_ext = "css"
exclude = ["_*.scss", "legacy/**"]

[rules.txt]
task = "es"

[dev]
port = 8080
base_path = "docs"
"#,
    )
    .unwrap();

    assert_eq!(config.input, PathBuf::from("/project/site"));
    assert_eq!(config.cache_file, PathBuf::from("/project/tmp/cache.json"));
    assert_eq!(config.signer, Signer::Sha256);
    assert_eq!(config.rules.len(), 3);

    let es6 = config.rules.get("es6").unwrap();
    assert_eq!(es6.output_ext, "js");
    assert_eq!(es6.exclude_patterns(), ["**/vendor/**"]);
    assert_eq!(es6.task.name(), "es");

    let scss = config.rules.get("scss").unwrap();
    assert_eq!(scss.exclude_patterns().len(), 2);

    // bare string rule keeps its extension
    assert_eq!(config.rules.get("txt").unwrap().output_ext, "txt");

    assert_eq!(
      config.scanners.extract("/project/site/main.es6", "import \"./util\""),
      ["/project/site/util.es6"]
    );

    assert_eq!(config.dev.port, 8080);
    assert_eq!(config.dev.base_path, "/docs/");

    assert!(config.is_excluded(Path::new("/project/site/css/old.bak")));
    assert!(!config.is_excluded(Path::new("/project/site/css/main.scss")));
  }

  #[test]
  fn undefined_task_errors() {
    let err = load("[rules.es6]\ntask = \"missing\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::UndefinedTask { ref task, .. } if task == "missing"));
  }

  #[test]
  fn invalid_glob_errors() {
    let err = load("[tasks.t]\ncommand = \"cat\"\n[rules.js]\ntask = \"t\"\nexclude = \"a/{b\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidGlob { .. }));
  }

  #[test]
  fn invalid_dependency_pattern_errors() {
    let err = load("[tasks.t]\ncommand = \"cat\"\n[rules.js]\ntask = \"t\"\n[rules.js.deps]\npatterns = [\"(\"]\n")
      .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPattern { .. }));
  }

  #[test]
  fn unknown_keys_are_rejected() {
    assert!(matches!(load("inptu = \"src\"\n"), Err(ConfigError::Parse(_))));
  }

  #[test]
  fn base_path_normalization() {
    assert_eq!(normalize_base_path("").unwrap(), "/");
    assert_eq!(normalize_base_path("/").unwrap(), "/");
    assert_eq!(normalize_base_path("/docs").unwrap(), "/docs/");
    assert_eq!(normalize_base_path("docs/v1/").unwrap(), "/docs/v1/");
    assert!(normalize_base_path("http://example.com").is_err());
  }

  #[test]
  fn load_config_resolves_against_file_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kiln.toml");
    std::fs::write(&path, "input = \"assets\"\n").unwrap();

    let config = load_config(&path, BuildMode::Prod).unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    assert_eq!(config.root, root);
    assert_eq!(config.input, root.join("assets"));
    assert_eq!(config.mode, BuildMode::Prod);
  }

  #[test]
  fn missing_config_file_errors() {
    let temp = TempDir::new().unwrap();
    let err = load_config(&temp.path().join("kiln.toml"), BuildMode::Dev).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }
}
