//! Asset pipeline: records, tasks and the per-rule router.

pub mod asset;
pub mod router;
pub mod task;

pub use asset::Asset;
pub use router::Router;
pub use task::{CommandTask, FnTask, IdentityTask, Task, TaskError, TaskResult, run_single};
