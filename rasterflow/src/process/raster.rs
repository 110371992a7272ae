//! The raster process manager.
//!
//! Given a program `[from_start, r_1, t_1, r_2, ..., r_N, to_end]` it builds:
//!
//! ```text
//!   r_1     r_3     r_5   ...  r_N        (no predecessors, run in parallel)
//!    | \   / | \   / |          |
//!    |  t_2  |  t_4  |          |         (each step waits on both neighbours)
//!    |       |       |          |
//! from_start                  to_end
//! ```
//!
//! Every box is a failure chain; the run succeeds only if all of them do.

use super::{ProcessManager, ProcessManagerConfig};
use crate::cancellation::{CancelReason, CancellationToken};
use crate::context::{PlanningEnvironment, ProcessInput, RunContext};
use crate::core::{PipelineOutcome, TaskStatus};
use crate::errors::RasterflowError;
use crate::events::{EventKind, EventSink, NoOpEventSink, PlanningEvent};
use crate::graph::{
    ChainCallback, ChainReport, FailureChainBuilder, TaskGraph, TaskId, TaskKind, TaskReport,
};
use crate::plan::{validate_raster_input, CompositeInstruction, PlanNode};
use crate::stages::{default_freespace_stages, default_raster_stages, StageList};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Summary of one `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Run id shared by every event of the run.
    pub run_id: Uuid,
    /// True only if every branch succeeded and the run was not cancelled.
    pub success: bool,
    /// Whether cancellation was requested during the run.
    pub cancelled: bool,
    /// Why the run was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
    /// Number of branches (failure chains) in the graph.
    pub branches: usize,
    /// Number of branches that reached success.
    pub succeeded: usize,
    /// Names of branches that failed or were cancelled, sorted.
    pub failed_branches: Vec<String>,
    /// Per-task reports, in task id order.
    pub tasks: Vec<TaskReport>,
    /// Wall time of the run.
    pub duration_ms: f64,
}

impl ExecutionSummary {
    /// Returns the report of the named task.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task == name)
    }

    /// Returns the status of the named task.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<TaskStatus> {
        self.task(name).map(|t| t.status)
    }
}

/// Clears the active token however a run ends.
struct RunGuard<'a> {
    manager: &'a RasterProcessManager,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.manager.active.lock() = None;
    }
}

/// Plans raster programs by running independent rasters in parallel and
/// gating each transition on the two rasters it connects.
pub struct RasterProcessManager {
    config: ProcessManagerConfig,
    raster_stages: StageList,
    freespace_stages: StageList,
    event_sink: Arc<dyn EventSink>,
    graph: Option<TaskGraph>,
    environment: Option<Arc<PlanningEnvironment>>,
    outcome: Arc<PipelineOutcome>,
    active: Mutex<Option<Arc<CancellationToken>>>,
    last_summary: Mutex<Option<ExecutionSummary>>,
}

impl Default for RasterProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterProcessManager {
    /// Creates a manager with default configuration and no stages.
    ///
    /// Empty stage lists are replaced with the defaults at `init`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ProcessManagerConfig::default(),
            raster_stages: Vec::new(),
            freespace_stages: Vec::new(),
            event_sink: Arc::new(NoOpEventSink),
            graph: None,
            environment: None,
            outcome: Arc::new(PipelineOutcome::new()),
            active: Mutex::new(None),
            last_summary: Mutex::new(None),
        }
    }

    /// Sets the stages tried, in order, on every raster.
    #[must_use]
    pub fn with_raster_stages(mut self, stages: StageList) -> Self {
        self.raster_stages = stages;
        self
    }

    /// Sets the stages tried, in order, on transitions and brackets.
    #[must_use]
    pub fn with_freespace_stages(mut self, stages: StageList) -> Self {
        self.freespace_stages = stages;
        self
    }

    /// Sets the sink receiving planning events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ProcessManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ProcessManagerConfig {
        &self.config
    }

    /// Returns the task graph built by the last successful `init`.
    #[must_use]
    pub const fn graph(&self) -> Option<&TaskGraph> {
        self.graph.as_ref()
    }

    /// Returns the shared outcome of the current or last run.
    #[must_use]
    pub fn outcome(&self) -> &PipelineOutcome {
        &self.outcome
    }

    /// Returns the summary of the last finished run.
    #[must_use]
    pub fn last_summary(&self) -> Option<ExecutionSummary> {
        self.last_summary.lock().clone()
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    fn callbacks(&self) -> (ChainCallback, ChainCallback) {
        let on_success = Arc::clone(&self.outcome);
        let on_failure = Arc::clone(&self.outcome);
        (
            Arc::new(move |report: &ChainReport| on_success.record_success(&report.chain)),
            Arc::new(move |report: &ChainReport| {
                warn!(
                    branch = %report.chain,
                    status = %report.status,
                    attempts = report.attempts.len(),
                    "Failed to find a valid solution"
                );
                on_failure.record_failure(&report.chain, report.status);
            }),
        )
    }

    fn build_graph(&self, root: &CompositeInstruction) -> Result<TaskGraph, RasterflowError> {
        let child = |index: usize| -> Result<Arc<PlanNode>, RasterflowError> {
            root.get(index)
                .cloned()
                .ok_or_else(|| RasterflowError::Internal(format!("missing child {index}")))
        };

        let raster_chains = FailureChainBuilder::new(self.raster_stages.clone());
        let freespace_chains = FailureChainBuilder::new(self.freespace_stages.clone());
        let mut graph = TaskGraph::new(self.config.name.clone());
        let last = root.len() - 1;

        // Rasters are independent of everything
        let mut rasters: Vec<TaskId> = Vec::new();
        for index in (1..last).step_by(2) {
            let (ok, fail) = self.callbacks();
            let chain = raster_chains.generate(format!("raster_{index}"), child(index)?, ok, fail);
            rasters.push(graph.add_chain(TaskKind::Raster, chain));
        }

        // Each transition step waits on the rasters either side of it
        for (pair, index) in (2..last).step_by(2).enumerate() {
            let transition = child(index)?;
            let steps = transition.as_composite().ok_or_else(|| {
                RasterflowError::Internal(format!("transition {index} is not a composite"))
            })?;
            for (step, node) in steps.iter().enumerate() {
                let (ok, fail) = self.callbacks();
                let name = format!("transition_{index}.{step}");
                let chain = freespace_chains.generate(name, Arc::clone(node), ok, fail);
                let id = graph.add_chain(TaskKind::Transition, chain);
                graph.succeed(id, rasters[pair])?;
                graph.succeed(id, rasters[pair + 1])?;
            }
        }

        let (first, final_raster) = match (rasters.first(), rasters.last()) {
            (Some(&first), Some(&final_raster)) => (first, final_raster),
            _ => return Err(RasterflowError::Internal("program has no rasters".to_string())),
        };

        let (ok, fail) = self.callbacks();
        let from_start = graph.add_chain(
            TaskKind::FromStart,
            freespace_chains.generate("from_start", child(0)?, ok, fail),
        );
        graph.precede(first, from_start)?;

        let (ok, fail) = self.callbacks();
        let to_end = graph.add_chain(
            TaskKind::ToEnd,
            freespace_chains.generate("to_end", child(last)?, ok, fail),
        );
        graph.precede(final_raster, to_end)?;

        Ok(graph)
    }

    /// Validates `input` and builds the task graph.
    ///
    /// On error no graph is left behind. A failed dot dump is logged and
    /// otherwise ignored.
    pub fn try_init(&mut self, input: ProcessInput) -> Result<(), RasterflowError> {
        self.graph = None;
        self.environment = None;
        self.config.validate()?;
        validate_raster_input(&input)?;

        let (Some(environment), Some(root)) = (input.environment.clone(), input.root_composite())
        else {
            return Err(RasterflowError::Internal(
                "validated input lost its environment or root".to_string(),
            ));
        };

        if self.raster_stages.is_empty() {
            debug!("No raster stages configured, using defaults");
            self.raster_stages = default_raster_stages();
        }
        if self.freespace_stages.is_empty() {
            debug!("No freespace stages configured, using defaults");
            self.freespace_stages = default_freespace_stages();
        }

        let graph = self.build_graph(root)?;
        info!(
            graph = %graph.name(),
            tasks = graph.len(),
            rasters = graph.tasks_of_kind(TaskKind::Raster).count(),
            transitions = graph.tasks_of_kind(TaskKind::Transition).count(),
            "Built raster task graph"
        );

        if let Some(path) = &self.config.dot_path {
            if let Err(e) = graph.write_dot(path) {
                warn!(path = %path.display(), "Failed to write task graph dump: {}", e);
            }
        }

        self.graph = Some(graph);
        self.environment = Some(environment);
        Ok(())
    }

    /// Runs the graph with the configured timeout, if any.
    pub async fn try_execute(&self) -> Result<ExecutionSummary, RasterflowError> {
        self.run(self.config.timeout()).await
    }

    /// Runs the graph, cancelling it once `timeout` has elapsed.
    ///
    /// Work already started is still joined before this returns.
    pub async fn execute_with_timeout(&self, timeout: Duration) -> bool {
        Self::verdict(self.run(Some(timeout)).await)
    }

    fn verdict(result: Result<ExecutionSummary, RasterflowError>) -> bool {
        match result {
            Ok(summary) => summary.success,
            Err(e) => {
                error!("Raster process execution failed: {}", e);
                false
            }
        }
    }

    async fn run(&self, timeout: Option<Duration>) -> Result<ExecutionSummary, RasterflowError> {
        let (Some(graph), Some(environment)) = (&self.graph, &self.environment) else {
            return Err(RasterflowError::NotInitialized);
        };

        let token = Arc::new(CancellationToken::new());
        let run = RunContext::new(Arc::clone(environment))
            .with_cancel_token(Arc::clone(&token))
            .with_event_sink(Arc::clone(&self.event_sink));
        let run_id = run.run_id();
        {
            let sink = Arc::clone(&self.event_sink);
            token.on_cancel(move |reason| {
                warn!(%run_id, %reason, "Cancelling raster run");
                sink.try_emit(
                    PlanningEvent::new(EventKind::RunCancelled, run_id).with_message(reason.to_string()),
                );
            });
        }

        // published under the lock that rejects a second run: once
        // is_running() is true, terminate() reaches this token
        {
            let mut active = self.active.lock();
            if active.is_some() {
                return Err(RasterflowError::AlreadyRunning);
            }
            *active = Some(Arc::clone(&token));
        }
        let _guard = RunGuard { manager: self };

        self.outcome.reset();
        let branches = graph.len();
        run.emit(PlanningEvent::new(EventKind::RunStarted, run_id)).await;
        info!(%run_id, branches, "Executing raster process");

        let timer = timeout.map(|budget| {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                let budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
                token.cancel(CancelReason::Timeout { budget_ms });
            })
        });

        let result = graph.execute(&run, self.config.max_parallel_tasks).await;
        if let Some(timer) = timer {
            timer.abort();
        }
        let result = result?;

        let cancel_reason = token.reason();
        let cancelled = result.cancelled || cancel_reason.is_some();
        let all_branches_ok = self.outcome.finish(branches);
        if all_branches_ok != result.success && !cancelled {
            warn!(%run_id, "Branch callbacks disagree with task reports");
        }
        let success = all_branches_ok && result.success && !cancelled;

        let summary = ExecutionSummary {
            run_id,
            success,
            cancelled,
            cancel_reason,
            branches,
            succeeded: self.outcome.succeeded_count(),
            failed_branches: self.outcome.failed_branches(),
            tasks: result.reports,
            duration_ms: result.duration_ms,
        };

        let status = if success {
            TaskStatus::Success
        } else if cancelled {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Failure
        };
        run.emit(PlanningEvent::new(EventKind::RunCompleted, run_id).with_status(status))
            .await;
        info!(
            %run_id,
            success,
            cancelled,
            failed = ?summary.failed_branches,
            duration_ms = summary.duration_ms,
            "Raster process finished"
        );

        *self.last_summary.lock() = Some(summary.clone());
        Ok(summary)
    }
}

#[async_trait]
impl ProcessManager for RasterProcessManager {
    fn init(&mut self, input: ProcessInput) -> bool {
        match self.try_init(input) {
            Ok(()) => true,
            Err(RasterflowError::Validation(err)) => {
                error!(
                    code = err.code(),
                    index = ?err.index,
                    hint = ?err.fix_hint,
                    "Invalid process input: {}", err.message
                );
                false
            }
            Err(e) => {
                error!("Failed to build raster task graph: {}", e);
                false
            }
        }
    }

    async fn execute(&self) -> bool {
        Self::verdict(self.try_execute().await)
    }

    fn terminate(&self) -> bool {
        let active = self.active.lock().clone();
        if let Some(token) = active {
            token.cancel(CancelReason::Terminated);
            true
        } else {
            warn!("{}", RasterflowError::Unsupported("nothing to terminate".to_string()));
            false
        }
    }

    fn clear(&mut self) -> bool {
        self.graph = None;
        self.environment = None;
        *self.last_summary.lock() = None;
        self.outcome.reset();
        debug!("Cleared raster process manager");
        true
    }
}

impl fmt::Debug for RasterProcessManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterProcessManager")
            .field("config", &self.config)
            .field("raster_stages", &self.raster_stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field(
                "freespace_stages",
                &self.freespace_stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("tasks", &self.graph.as_ref().map(TaskGraph::len))
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
