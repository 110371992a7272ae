//! Sequential failure chains.
//!
//! A chain tries an ordered list of stages on one plan node and stops at
//! the first success:
//!
//! ```text
//! attempt_0 --fail--> attempt_1 --fail--> ... attempt_k --fail--> failure
//!     |                   |                       |
//!     ok                  ok                      ok
//!     +-------------------+-----------------------+----------> success
//! ```
//!
//! Exactly one of the chain's two callbacks fires per run.

use crate::context::{RunContext, StageContext};
use crate::core::{StageOutput, TaskStatus};
use crate::events::{EventKind, PlanningEvent};
use crate::plan::PlanNode;
use crate::stages::{Stage, StageList};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{self, Write as _};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Callback invoked when a chain reaches its success or failure terminal.
pub type ChainCallback = Arc<dyn Fn(&ChainReport) + Send + Sync>;

/// Record of one stage attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Stage name.
    pub stage: String,
    /// Attempt status.
    pub status: TaskStatus,
    /// Failure reason reported by the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall time of the attempt.
    pub duration_ms: f64,
}

/// Result of running a failure chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    /// Chain name.
    pub chain: String,
    /// Final status: success, failure or cancelled.
    pub status: TaskStatus,
    /// The stage that succeeded, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// Every attempt made, in order.
    pub attempts: Vec<AttemptRecord>,
    /// Wall time of the whole chain.
    pub duration_ms: f64,
}

impl ChainReport {
    /// Returns true if some stage succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs one stage attempt, turning a panic into a failed output.
pub(crate) async fn attempt_stage(
    stage: &dyn Stage,
    node: &PlanNode,
    ctx: &StageContext,
) -> StageOutput {
    match AssertUnwindSafe(stage.attempt(node, ctx)).catch_unwind().await {
        Ok(output) => output,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            warn!(task = ctx.task_name(), stage = stage.name(), "Stage panicked: {}", reason);
            StageOutput::fail(format!("stage panicked: {reason}"))
        }
    }
}

pub(crate) fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A fail-fast fallback chain over one plan node.
pub struct FailureChain {
    name: String,
    node: Arc<PlanNode>,
    stages: StageList,
    on_success: ChainCallback,
    on_failure: ChainCallback,
}

impl FailureChain {
    /// Returns the chain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the plan node the chain plans for.
    #[must_use]
    pub const fn node(&self) -> &Arc<PlanNode> {
        &self.node
    }

    /// Returns the number of stages in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages and can only fail.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the names of the attempt tasks, in chain order.
    #[must_use]
    pub fn attempt_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .enumerate()
            .map(|(index, stage)| format!("{}/{}:{}", self.name, index, stage.name()))
            .collect()
    }

    /// Runs the chain to one of its terminals and fires the matching callback.
    ///
    /// Cancellation is checked before every attempt; an attempt already
    /// running is allowed to finish.
    pub async fn run(&self, run: &RunContext) -> ChainReport {
        let started = Instant::now();
        let mut attempts = Vec::with_capacity(self.stages.len());
        let mut status = TaskStatus::Failure;
        let mut resolved_by = None;

        if self.stages.is_empty() {
            warn!(chain = %self.name, "Failure chain has no stages; it can only fail");
        }

        for (index, stage) in self.stages.iter().enumerate() {
            if run.is_cancelled() {
                debug!(chain = %self.name, attempt = index, "Chain cancelled before attempt");
                status = TaskStatus::Cancelled;
                break;
            }

            let ctx = run.stage_context(&self.name, stage.name(), index);
            let attempt_started = Instant::now();
            let output = attempt_stage(stage.as_ref(), &self.node, &ctx).await;
            attempts.push(AttemptRecord {
                stage: stage.name().to_string(),
                status: output.status,
                message: output.message.clone(),
                duration_ms: attempt_started.elapsed().as_secs_f64() * 1000.0,
            });

            if output.is_success() {
                debug!(chain = %self.name, stage = stage.name(), attempt = index, "Stage succeeded");
                status = TaskStatus::Success;
                resolved_by = Some(stage.name().to_string());
                break;
            }

            debug!(
                chain = %self.name,
                stage = stage.name(),
                attempt = index,
                reason = ?output.message,
                "Stage failed, falling back"
            );
            let mut event = PlanningEvent::new(EventKind::AttemptFailed, run.run_id())
                .with_task(self.name.clone())
                .with_stage(stage.name())
                .with_status(output.status);
            if let Some(message) = output.message {
                event = event.with_message(message);
            }
            run.try_emit(event);
        }

        let report = ChainReport {
            chain: self.name.clone(),
            status,
            resolved_by,
            attempts,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        if report.is_success() {
            (self.on_success)(&report);
        } else {
            (self.on_failure)(&report);
        }
        report
    }

    /// Id of the dot node edges into this chain should point at.
    pub(crate) fn dot_entry(&self, id: &str) -> String {
        if self.stages.is_empty() {
            format!("{id}_fail")
        } else {
            format!("{id}_a0")
        }
    }

    /// Writes the chain as a Graphviz cluster.
    pub(crate) fn write_dot_cluster(&self, out: &mut String, id: &str, label: &str) {
        let _ = writeln!(out, "    subgraph cluster_{id} {{");
        let _ = writeln!(out, "        label=\"{}\";", escape_label(label));
        let _ = writeln!(out, "        style=rounded; color=\"#333333\";");
        for (index, stage) in self.stages.iter().enumerate() {
            let _ = writeln!(out, "        {id}_a{index} [label=\"{}\"];", escape_label(stage.name()));
        }
        let _ = writeln!(out, "        {id}_ok [label=\"success\", shape=doublecircle];");
        let _ = writeln!(out, "        {id}_fail [label=\"failure\", shape=doublecircle];");
        for index in 0..self.stages.len() {
            let _ = writeln!(out, "        {id}_a{index} -> {id}_ok [label=\"ok\"];");
            let next = if index + 1 < self.stages.len() {
                format!("{id}_a{}", index + 1)
            } else {
                format!("{id}_fail")
            };
            let _ = writeln!(out, "        {id}_a{index} -> {next} [label=\"fail\", style=dashed];");
        }
        let _ = writeln!(out, "    }}");
    }
}

impl fmt::Debug for FailureChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureChain")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builds failure chains over a fixed stage list.
///
/// The builder knows nothing about rasters or transitions; the same type
/// serves every role.
#[derive(Debug, Clone)]
pub struct FailureChainBuilder {
    stages: StageList,
}

impl FailureChainBuilder {
    /// Creates a builder over an ordered stage list.
    #[must_use]
    pub fn new(stages: StageList) -> Self {
        Self { stages }
    }

    /// Returns the stage list.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    /// Returns true if chains built here can only fail.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Generates a chain for `node`.
    #[must_use]
    pub fn generate(
        &self,
        name: impl Into<String>,
        node: Arc<PlanNode>,
        on_success: ChainCallback,
        on_failure: ChainCallback,
    ) -> FailureChain {
        FailureChain {
            name: name.into(),
            node,
            stages: self.stages.clone(),
            on_success,
            on_failure,
        }
    }
}
