//! Process managers: turn a validated plan tree into a task graph and run it.

mod config;
mod raster;

pub use config::{ProcessManagerConfig, ENV_DOT_PATH, ENV_MAX_PARALLEL, ENV_TIMEOUT_MS};
pub use raster::{ExecutionSummary, RasterProcessManager};

use crate::context::ProcessInput;
use async_trait::async_trait;

/// The lifecycle an orchestration layer drives a planner through.
///
/// `init` builds the task graph, `execute` runs it (any number of times),
/// `clear` returns to the pre-`init` state. `terminate` asks an in-flight
/// run to stop.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Validates `input` and builds the task graph.
    ///
    /// Returns false, leaving no graph, if the input is malformed.
    fn init(&mut self, input: ProcessInput) -> bool;

    /// Runs the task graph to completion.
    ///
    /// Returns true only if every branch reached its success terminal.
    async fn execute(&self) -> bool;

    /// Requests cancellation of the in-flight run.
    ///
    /// Returns false if nothing is running.
    fn terminate(&self) -> bool;

    /// Discards the graph and any per-run state.
    fn clear(&mut self) -> bool;
}
