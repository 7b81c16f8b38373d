//! kiln-lib: incremental asset pipeline engine.
//!
//! Source files are routed by extension through configured transform tasks.
//! A content cache paired with a dependency graph decides which files need
//! work, so repeated builds, watch cycles and dev server requests only redo
//! what changed:
//! - `cache`: content signatures, the incremental gate and the cache file
//! - `graph`: forward and reverse dependency edges between files
//! - `pipeline` / `rule`: assets, tasks and the per-rule router
//! - `build` / `watch` / `dev`: batch builds, continuous rebuilds and the on-demand server

pub mod build;
pub mod cache;
pub mod config;
pub mod consts;
pub mod dev;
pub mod graph;
pub mod mode;
pub mod pipeline;
pub mod rule;
pub mod util;
pub mod watch;
