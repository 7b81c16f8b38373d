//! Transformation rules.
//!
//! A rule binds one input extension to a task and an output extension. Rules
//! are looked up forward (input path -> rule) by the router and backward
//! (requested output path -> rule and input path) by the dev server.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::pipeline::{IdentityTask, Task};
use crate::util::path::{extension_of, relative_slash, replace_extension};

#[derive(Debug, Clone)]
pub struct Rule {
  pub input_ext: String,
  pub output_ext: String,
  pub task: Arc<dyn Task>,
  exclude: GlobSet,
  exclude_patterns: Vec<String>,
}

impl Rule {
  pub fn new(input_ext: &str, output_ext: &str, task: Arc<dyn Task>) -> Self {
    Self {
      input_ext: input_ext.to_lowercase(),
      output_ext: output_ext.to_lowercase(),
      task,
      exclude: GlobSet::empty(),
      exclude_patterns: Vec::new(),
    }
  }

  /// Add exclusion globs, matched against the path relative to the input root.
  pub fn with_exclude(mut self, patterns: &[String]) -> Result<Self, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
      builder.add(Glob::new(pattern)?);
    }
    self.exclude = builder.build()?;
    self.exclude_patterns = patterns.to_vec();
    Ok(self)
  }

  pub fn exclude_patterns(&self) -> &[String] {
    &self.exclude_patterns
  }

  /// Map a requested output path back to the input it is built from.
  pub fn input_path(&self, output: &str) -> String {
    replace_extension(output, &self.output_ext, &self.input_ext)
  }

  pub fn output_path(&self, input: &str) -> String {
    replace_extension(input, &self.input_ext, &self.output_ext)
  }

  /// Whether `path` matches an exclusion glob. Paths under `base` are matched
  /// relative to it; anything else is matched as given.
  pub fn is_excluded(&self, path: &Path, base: &Path) -> bool {
    if self.exclude.is_empty() {
      return false;
    }
    match relative_slash(path, base) {
      Some(rel) => self.exclude.is_match(rel),
      None => self.exclude.is_match(path),
    }
  }
}

/// A rule lookup result: a configured rule or the empty rule.
///
/// The empty rule maps paths to themselves, never excludes and runs no transform.
#[derive(Debug, Clone, Copy)]
pub enum RuleRef<'a> {
  Rule(&'a Rule),
  Empty,
}

impl RuleRef<'_> {
  pub fn input_path(&self, output: &str) -> String {
    match self {
      RuleRef::Rule(rule) => rule.input_path(output),
      RuleRef::Empty => output.to_string(),
    }
  }

  pub fn output_path(&self, input: &str) -> String {
    match self {
      RuleRef::Rule(rule) => rule.output_path(input),
      RuleRef::Empty => input.to_string(),
    }
  }

  pub fn is_excluded(&self, path: &Path, base: &Path) -> bool {
    match self {
      RuleRef::Rule(rule) => rule.is_excluded(path, base),
      RuleRef::Empty => false,
    }
  }

  pub fn task(&self) -> Arc<dyn Task> {
    match self {
      RuleRef::Rule(rule) => rule.task.clone(),
      RuleRef::Empty => Arc::new(IdentityTask),
    }
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, RuleRef::Empty)
  }
}

/// All rules, keyed by lowercase input extension.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
  rules: BTreeMap<String, Rule>,
}

impl RuleSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a rule, replacing any rule with the same input extension.
  pub fn insert(&mut self, rule: Rule) {
    self.rules.insert(rule.input_ext.clone(), rule);
  }

  pub fn get(&self, input_ext: &str) -> Option<&Rule> {
    self.rules.get(&input_ext.to_lowercase())
  }

  pub fn iter(&self) -> impl Iterator<Item = &Rule> {
    self.rules.values()
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// The rule transforming `path`, unless none matches its extension or the
  /// rule excludes it.
  pub fn find_rule_by_input(&self, path: &Path, base: &Path) -> Option<&Rule> {
    let rule = self.get(&extension_of(path)?)?;
    if rule.is_excluded(path, base) {
      return None;
    }
    Some(rule)
  }

  /// Invert a requested output path.
  ///
  /// Rules whose output extension matches are tried in order, then the empty
  /// rule. A candidate is accepted when its input path exists according to
  /// `exists` and is not excluded. `None` when nothing fits.
  pub fn find_rule_by_output(
    &self,
    output: &str,
    base: &Path,
    exists: impl Fn(&Path) -> bool,
  ) -> Option<RuleRef<'_>> {
    let ext = extension_of(Path::new(output));
    let candidates = self
      .rules
      .values()
      .filter(|rule| ext.as_deref() == Some(rule.output_ext.as_str()))
      .map(RuleRef::Rule)
      .chain(std::iter::once(RuleRef::Empty));

    for candidate in candidates {
      let input = base.join(candidate.input_path(output).trim_start_matches('/'));
      if !exists(&input) || candidate.is_excluded(&input, base) {
        continue;
      }
      return Some(candidate);
    }
    None
  }
}
