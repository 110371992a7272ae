//! Task graphs and failure chains.
//!
//! - [`FailureChain`]: try stages in order until one succeeds
//! - [`TaskGraph`]: run tasks in parallel, gated only on predecessor completion

mod dag;
mod failure_chain;
mod task;

pub use dag::{GraphExecutionResult, TaskGraph};
pub use failure_chain::{AttemptRecord, ChainCallback, ChainReport, FailureChain, FailureChainBuilder};
pub use task::{TaskBody, TaskId, TaskKind, TaskNode, TaskReport};
