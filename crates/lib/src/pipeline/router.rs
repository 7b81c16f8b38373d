//! Per-rule fan-out.
//!
//! Every rule gets its own lane: a bounded input channel feeding one instance
//! of the rule's task. Assets are routed by extension, rewritten to the output
//! extension on the way in, and everything (lane outputs plus pass-through)
//! is merged into a single output stream.
//!
//! The output closes only after the feed has ended, every lane input has been
//! closed and every lane output has drained.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use super::asset::Asset;
use super::task::TaskResult;
use crate::consts::LANE_CAPACITY;
use crate::rule::RuleSet;

pub struct Router {
  rules: Arc<RuleSet>,
  capacity: usize,
}

impl Router {
  pub fn new(rules: Arc<RuleSet>) -> Self {
    Self {
      rules,
      capacity: LANE_CAPACITY,
    }
  }

  /// Start routing `feed`. Returns the merged output stream.
  pub fn spawn(self, mut feed: mpsc::Receiver<Asset>) -> mpsc::Receiver<TaskResult> {
    let (merged_tx, merged_rx) = mpsc::channel(self.capacity);

    let mut lanes = std::collections::HashMap::new();
    let mut forwarders = JoinSet::new();
    for rule in self.rules.iter() {
      let (lane_tx, lane_rx) = mpsc::channel::<Asset>(self.capacity);
      let mut lane_out = rule.task.clone().pipe(lane_rx);
      let out = merged_tx.clone();
      let ext = rule.input_ext.clone();
      forwarders.spawn(async move {
        while let Some(item) = lane_out.recv().await {
          if out.send(item).await.is_err() {
            break;
          }
        }
        trace!(lane = %ext, "lane drained");
      });
      lanes.insert(rule.input_ext.clone(), lane_tx);
    }

    let rules = self.rules;
    tokio::spawn(async move {
      while let Some(mut asset) = feed.recv().await {
        if merged_tx.is_closed() {
          debug!("output dropped, stopping router");
          break;
        }
        let Some(rule) = rules.find_rule_by_input(&asset.path, &asset.base) else {
          trace!(path = %asset.path.display(), "no rule, passing through");
          if merged_tx.send(Ok(asset)).await.is_err() {
            break;
          }
          continue;
        };

        asset.rewrite_extension(&rule.input_ext, &rule.output_ext);
        let Some(lane) = lanes.get(&rule.input_ext) else {
          continue;
        };
        if lane.send(asset).await.is_err() {
          // the lane's task stopped after a failure it already reported
          warn!(lane = %rule.input_ext, "lane closed, dropping asset");
        }
      }

      drop(lanes);
      while let Some(result) = forwarders.join_next().await {
        if let Err(e) = result {
          warn!(error = %e, "lane forwarder panicked");
        }
      }
      debug!("router drained");
      drop(merged_tx);
    });

    merged_rx
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use super::*;
  use crate::pipeline::task::{FnTask, Task, TaskError, spawn_each};
  use crate::rule::Rule;

  fn base() -> PathBuf {
    PathBuf::from("/site/src")
  }

  async fn route(rules: RuleSet, assets: Vec<Asset>) -> Vec<TaskResult> {
    let (tx, rx) = mpsc::channel(8);
    let mut out = Router::new(Arc::new(rules)).spawn(rx);
    for asset in assets {
      tx.send(asset).await.unwrap();
    }
    drop(tx);

    let mut results = Vec::new();
    while let Some(item) = out.recv().await {
      results.push(item);
    }
    results
  }

  fn prefix_task(prefix: &'static str) -> Arc<FnTask> {
    Arc::new(FnTask::map_contents(prefix, move |contents| {
      [prefix.as_bytes(), contents].concat()
    }))
  }

  #[tokio::test]
  async fn excluded_paths_pass_through_untouched() {
    let mut rules = RuleSet::new();
    rules.insert(
      Rule::new("es6", "js", prefix_task("transformed:"))
        .with_exclude(&["**/vendor/**".to_string()])
        .unwrap(),
    );

    let mut results: Vec<Asset> = route(
      rules,
      vec![
        Asset::new(base().join("test.es6"), base(), "a"),
        Asset::new(base().join("vendor/test.es6"), base(), "b"),
      ],
    )
    .await
    .into_iter()
    .map(Result::unwrap)
    .collect();
    results.sort_by(|a, b| a.path.cmp(&b.path));

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].path, base().join("test.js"));
    assert_eq!(results[0].contents, b"transformed:a");
    assert_eq!(results[1].path, base().join("vendor/test.es6"));
    assert_eq!(results[1].contents, b"b");
  }

  #[tokio::test]
  async fn lanes_keep_fifo_order() {
    let mut rules = RuleSet::new();
    rules.insert(Rule::new("scss", "css", prefix_task("css:")));
    rules.insert(Rule::new("es6", "js", prefix_task("js:")));

    let assets = (0..10)
      .map(|i| {
        let ext = if i % 2 == 0 { "scss" } else { "es6" };
        Asset::new(base().join(format!("{}.{}", i, ext)), base(), i.to_string())
      })
      .collect();
    let results: Vec<Asset> = route(rules, assets).await.into_iter().map(Result::unwrap).collect();

    let css: Vec<_> = results.iter().filter(|a| a.path.extension().unwrap() == "css").collect();
    let js: Vec<_> = results.iter().filter(|a| a.path.extension().unwrap() == "js").collect();
    assert_eq!(css.len(), 5);
    assert_eq!(js.len(), 5);
    assert!(css.windows(2).all(|w| w[0].contents < w[1].contents));
    assert!(js.windows(2).all(|w| w[0].contents < w[1].contents));
  }

  #[tokio::test]
  async fn unmatched_extensions_pass_through() {
    let mut rules = RuleSet::new();
    rules.insert(Rule::new("es6", "js", prefix_task("js:")));

    let results = route(rules, vec![Asset::new(base().join("logo.png"), base(), "png")]).await;
    let asset = results.into_iter().next().unwrap().unwrap();
    assert_eq!(asset.path, base().join("logo.png"));
    assert_eq!(asset.contents, b"png");
  }

  #[tokio::test]
  async fn task_failure_is_forwarded() {
    let mut rules = RuleSet::new();
    rules.insert(Rule::new(
      "es6",
      "js",
      Arc::new(FnTask::new("broken", |asset: Asset| {
        Err(TaskError::Transform {
          task: "broken".to_string(),
          path: asset.path,
          message: "syntax error".to_string(),
        })
      })),
    ));

    let results = route(
      rules,
      vec![
        Asset::new(base().join("a.es6"), base(), "a"),
        Asset::new(base().join("b.es6"), base(), "b"),
        Asset::new(base().join("c.txt"), base(), "c"),
      ],
    )
    .await;

    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Ok(a) if a.path == base().join("c.txt"))));
  }

  #[tokio::test]
  async fn output_closes_after_every_lane_drains() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = processed.clone();
    let mut rules = RuleSet::new();
    rules.insert(Rule::new(
      "es6",
      "js",
      Arc::new(FnTask::new("count", move |asset: Asset| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![asset])
      })),
    ));

    let assets = (0..50)
      .map(|i| Asset::new(base().join(format!("{}.es6", i)), base(), ""))
      .collect();
    let results = route(rules, assets).await;

    assert_eq!(results.len(), 50);
    assert_eq!(processed.load(Ordering::SeqCst), 50);
  }

  /// Sleeps before passing each asset on.
  #[derive(Debug)]
  struct SlowTask {
    delay: Duration,
    done: Arc<AtomicUsize>,
  }

  impl Task for SlowTask {
    fn name(&self) -> &str {
      "slow"
    }

    fn pipe(self: Arc<Self>, input: mpsc::Receiver<Asset>) -> mpsc::Receiver<TaskResult> {
      spawn_each(input, move |asset| {
        let task = self.clone();
        async move {
          tokio::time::sleep(task.delay).await;
          task.done.fetch_add(1, Ordering::SeqCst);
          Ok(vec![asset])
        }
      })
    }
  }

  #[tokio::test]
  async fn slow_lanes_finish_before_output_closes() {
    let done = Arc::new(AtomicUsize::new(0));
    let mut rules = RuleSet::new();
    rules.insert(Rule::new(
      "es6",
      "js",
      Arc::new(SlowTask {
        delay: Duration::from_millis(20),
        done: done.clone(),
      }),
    ));
    rules.insert(Rule::new(
      "scss",
      "css",
      Arc::new(SlowTask {
        delay: Duration::from_millis(5),
        done: done.clone(),
      }),
    ));

    let assets = (0..10)
      .map(|i| {
        let ext = if i % 2 == 0 { "scss" } else { "es6" };
        Asset::new(base().join(format!("{}.{}", i, ext)), base(), i.to_string())
      })
      .collect();
    let results = route(rules, assets).await;

    // `route` returns only once the merged output has closed
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(done.load(Ordering::SeqCst), 10);
  }
}
