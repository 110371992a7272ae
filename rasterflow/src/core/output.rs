//! Stage output type returned by a single planning attempt.

use super::TaskStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The outcome of one stage attempt on a plan node.
///
/// Only the status matters to the engine. The message and metadata are
/// carried into chain reports for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The status of the attempt.
    pub status: TaskStatus,

    /// Diagnostic message, usually the failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Additional metadata reported by the stage.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for StageOutput {
    fn default() -> Self {
        Self::ok()
    }
}

impl StageOutput {
    fn with_status(status: TaskStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            metadata: HashMap::new(),
        }
    }

    /// Creates a successful output.
    #[must_use]
    pub fn ok() -> Self {
        Self::with_status(TaskStatus::Success, None)
    }

    /// Creates a successful output with a single metadata entry.
    #[must_use]
    pub fn ok_with(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::ok().add_metadata(key, value)
    }

    /// Creates a failure output with a reason.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::with_status(TaskStatus::Failure, Some(reason.into()))
    }

    /// Creates a cancelled output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self::with_status(TaskStatus::Cancelled, Some(reason.into()))
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the attempt succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the attempt failed or was cancelled.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_output() {
        let output = StageOutput::ok();
        assert_eq!(output.status, TaskStatus::Success);
        assert!(output.is_success());
        assert!(output.message.is_none());
    }

    #[test]
    fn test_ok_with_metadata() {
        let output = StageOutput::ok_with("iterations", serde_json::json!(12));
        assert!(output.is_success());
        assert_eq!(output.metadata.get("iterations"), Some(&serde_json::json!(12)));
    }

    #[test]
    fn test_fail_output() {
        let output = StageOutput::fail("collision detected");
        assert_eq!(output.status, TaskStatus::Failure);
        assert_eq!(output.message.as_deref(), Some("collision detected"));
        assert!(output.is_failure());
    }

    #[test]
    fn test_cancel_output() {
        let output = StageOutput::cancel("terminated");
        assert_eq!(output.status, TaskStatus::Cancelled);
        assert!(output.is_failure());
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(StageOutput::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success"}));
    }
}
