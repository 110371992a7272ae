//! Tasks: the scheduling units of a task graph.

use super::failure_chain::{attempt_stage, ChainReport, FailureChain};
use crate::context::RunContext;
use crate::core::TaskStatus;
use crate::plan::PlanNode;
use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Dense index of a task within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Returns the index of the task in its graph.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The role a task plays in a raster program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// An independent raster segment.
    Raster,
    /// One step of a transition between two rasters.
    Transition,
    /// The approach move into the first raster.
    FromStart,
    /// The departure move out of the last raster.
    ToEnd,
    /// A task outside the raster layout.
    Standalone,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raster => write!(f, "raster"),
            Self::Transition => write!(f, "transition"),
            Self::FromStart => write!(f, "from_start"),
            Self::ToEnd => write!(f, "to_end"),
            Self::Standalone => write!(f, "standalone"),
        }
    }
}

/// What a task does when it runs.
#[derive(Debug, Clone)]
pub enum TaskBody {
    /// A single stage attempt on a plan node.
    Attempt {
        /// The stage to attempt.
        stage: Arc<dyn Stage>,
        /// The node to plan for.
        node: Arc<PlanNode>,
    },
    /// A nested failure chain; the outer graph sees only its final status.
    Composed(Arc<FailureChain>),
}

/// Outcome of running a task body.
#[derive(Debug)]
pub(crate) struct BodyOutcome {
    pub status: TaskStatus,
    pub chain: Option<ChainReport>,
    pub message: Option<String>,
}

impl TaskBody {
    pub(crate) async fn run(&self, task_name: &str, run: &RunContext) -> BodyOutcome {
        match self {
            Self::Attempt { stage, node } => {
                if run.is_cancelled() {
                    return BodyOutcome {
                        status: TaskStatus::Cancelled,
                        chain: None,
                        message: run.cancel_token().reason().map(|r| r.to_string()),
                    };
                }
                let ctx = run.stage_context(task_name, stage.name(), 0);
                let output = attempt_stage(stage.as_ref(), node, &ctx).await;
                BodyOutcome {
                    status: output.status,
                    chain: None,
                    message: output.message,
                }
            }
            Self::Composed(chain) => {
                let report = chain.run(run).await;
                BodyOutcome {
                    status: report.status,
                    message: None,
                    chain: Some(report),
                }
            }
        }
    }
}

/// A node of a task graph.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) kind: TaskKind,
    pub(crate) predecessors: BTreeSet<TaskId>,
    pub(crate) successors: BTreeSet<TaskId>,
    pub(crate) body: TaskBody,
}

impl TaskNode {
    /// Returns the task id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task kind.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Tasks that must complete before this one may run.
    #[must_use]
    pub const fn predecessors(&self) -> &BTreeSet<TaskId> {
        &self.predecessors
    }

    /// Tasks waiting on this one.
    #[must_use]
    pub const fn successors(&self) -> &BTreeSet<TaskId> {
        &self.successors
    }

    /// Returns the task body.
    #[must_use]
    pub const fn body(&self) -> &TaskBody {
        &self.body
    }

    /// Returns the nested chain, for composed tasks.
    #[must_use]
    pub fn chain(&self) -> Option<&FailureChain> {
        match &self.body {
            TaskBody::Composed(chain) => Some(chain),
            TaskBody::Attempt { .. } => None,
        }
    }
}

/// Result of one task within a graph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// Task id.
    pub id: TaskId,
    /// Task name.
    pub task: String,
    /// Task kind.
    pub kind: TaskKind,
    /// Terminal status.
    pub status: TaskStatus,
    /// Nested chain report, for composed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainReport>,
    /// Diagnostic message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall time of the task.
    pub duration_ms: f64,
}

impl TaskReport {
    /// Returns true if the task succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
