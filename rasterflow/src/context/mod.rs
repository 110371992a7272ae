//! Run inputs and execution contexts.
//!
//! This module provides:
//! - The process input bundle handed to `init`
//! - The opaque planning environment
//! - Per-run and per-attempt contexts passed to stages

use crate::cancellation::CancellationToken;
use crate::events::{EventSink, NoOpEventSink, PlanningEvent};
use crate::plan::{CompositeInstruction, PlanNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The kinematic/environment model a run plans against.
///
/// The engine never looks inside; it only requires one to be present and
/// hands it to every stage attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningEnvironment {
    /// Environment name.
    pub name: String,
    /// Monotonic revision of the environment state.
    #[serde(default)]
    pub revision: u64,
    /// Free-form data for stages.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PlanningEnvironment {
    /// Creates a named environment at revision zero.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the revision.
    #[must_use]
    pub const fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Gets a metadata entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

/// Everything `init` needs: the environment and the plan tree.
#[derive(Debug, Clone)]
pub struct ProcessInput {
    /// The planning environment. Required; `None` fails validation.
    pub environment: Option<Arc<PlanningEnvironment>>,
    /// The root of the plan tree.
    pub instruction: Arc<PlanNode>,
}

impl ProcessInput {
    /// Creates an input with an environment.
    #[must_use]
    pub fn new(environment: Arc<PlanningEnvironment>, instruction: impl Into<PlanNode>) -> Self {
        Self {
            environment: Some(environment),
            instruction: Arc::new(instruction.into()),
        }
    }

    /// Creates an input with no environment.
    #[must_use]
    pub fn without_environment(instruction: impl Into<PlanNode>) -> Self {
        Self {
            environment: None,
            instruction: Arc::new(instruction.into()),
        }
    }

    /// Returns the root composite, if the root is one.
    #[must_use]
    pub fn root_composite(&self) -> Option<&CompositeInstruction> {
        self.instruction.as_composite()
    }
}

/// State shared by every task of one run.
#[derive(Clone)]
pub struct RunContext {
    run_id: Uuid,
    environment: Arc<PlanningEnvironment>,
    cancel_token: Arc<CancellationToken>,
    event_sink: Arc<dyn EventSink>,
}

impl RunContext {
    /// Creates a run context with a fresh run id, token and no-op sink.
    #[must_use]
    pub fn new(environment: Arc<PlanningEnvironment>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            environment,
            cancel_token: Arc::new(CancellationToken::new()),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Uses the given cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel_token = token;
        self
    }

    /// Uses the given event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the run id.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the environment.
    #[must_use]
    pub const fn environment(&self) -> &Arc<PlanningEnvironment> {
        &self.environment
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel_token
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Emits an event without blocking.
    pub fn try_emit(&self, event: PlanningEvent) {
        self.event_sink.try_emit(event);
    }

    /// Emits an event.
    pub async fn emit(&self, event: PlanningEvent) {
        self.event_sink.emit(event).await;
    }

    /// Builds the context for one stage attempt.
    #[must_use]
    pub fn stage_context(&self, task: &str, stage: &str, attempt: usize) -> StageContext {
        StageContext {
            run_id: self.run_id,
            task_name: task.to_string(),
            stage_name: stage.to_string(),
            attempt,
            environment: self.environment.clone(),
            cancel_token: self.cancel_token.clone(),
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("environment", &self.environment.name)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Context handed to a single stage attempt.
#[derive(Debug, Clone)]
pub struct StageContext {
    run_id: Uuid,
    task_name: String,
    stage_name: String,
    attempt: usize,
    environment: Arc<PlanningEnvironment>,
    cancel_token: Arc<CancellationToken>,
}

impl StageContext {
    /// Returns the run id.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the name of the task running the attempt.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the zero-based position of the stage in its chain.
    #[must_use]
    pub const fn attempt(&self) -> usize {
        self.attempt
    }

    /// Returns the planning environment.
    #[must_use]
    pub fn environment(&self) -> &PlanningEnvironment {
        &self.environment
    }

    /// Returns true if the run has been cancelled.
    ///
    /// Long-running stages may poll this to bail out early.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
