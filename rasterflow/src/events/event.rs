//! Typed planning events.

use crate::core::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of a planning event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A run started.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A task was dispatched to a worker.
    #[serde(rename = "task.started")]
    TaskStarted,
    /// A stage attempt inside a failure chain failed.
    #[serde(rename = "attempt.failed")]
    AttemptFailed,
    /// A task reached a terminal status.
    #[serde(rename = "task.completed")]
    TaskCompleted,
    /// Cancellation was requested for a run.
    #[serde(rename = "run.cancelled")]
    RunCancelled,
    /// Every task of a run was joined.
    #[serde(rename = "run.completed")]
    RunCompleted,
}

impl EventKind {
    /// Returns the dotted event type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::TaskStarted => "task.started",
            Self::AttemptFailed => "attempt.failed",
            Self::TaskCompleted => "task.completed",
            Self::RunCancelled => "run.cancelled",
            Self::RunCompleted => "run.completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event emitted while a run is executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningEvent {
    /// Event kind.
    pub kind: EventKind,
    /// The run this event belongs to.
    pub run_id: Uuid,
    /// Task name, for task and attempt events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Stage name, for attempt events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Status, for completion events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Free-text detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl PlanningEvent {
    /// Creates an event of the given kind for a run.
    #[must_use]
    pub fn new(kind: EventKind, run_id: Uuid) -> Self {
        Self {
            kind,
            run_id,
            task: None,
            stage: None,
            status: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the task name.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
