//! Error types for the rasterflow engine.
//!
//! Input errors are surfaced synchronously by `init`. Stage and branch
//! failures never show up here; they are absorbed into chain reports and
//! the aggregate pipeline outcome.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for rasterflow operations.
#[derive(Debug, Error)]
pub enum RasterflowError {
    /// The process input failed structural validation.
    #[error("{0}")]
    Validation(#[from] InputValidationError),

    /// Adding an edge would have introduced a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A task id does not belong to the graph.
    #[error("Unknown task id: {0}")]
    UnknownTask(usize),

    /// `execute` was called before a successful `init`.
    #[error("Process manager has no task graph; call init first")]
    NotInitialized,

    /// `execute` was called while another run was in progress.
    #[error("Process manager is already executing")]
    AlreadyRunning,

    /// The requested operation is not supported in the current state.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RasterflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// The structural rule a process input violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// No planning environment was supplied.
    MissingEnvironment,
    /// The root node is a plain instruction.
    RootNotComposite,
    /// The root composite cannot hold brackets plus one raster.
    TooFewChildren,
    /// The first child is not a composite.
    FromStartNotComposite,
    /// An interior child is not a composite.
    SegmentNotComposite,
    /// A raster composite has no children.
    EmptyRaster,
    /// A transition has several children but is not unordered.
    TransitionNotUnordered,
    /// The interior does not end on a raster.
    DanglingTransition,
    /// The last child is not a composite.
    ToEndNotComposite,
}

impl ValidationRule {
    /// Returns the stable diagnostic code for this rule.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingEnvironment => "INPUT-001-ENVIRONMENT",
            Self::RootNotComposite => "INPUT-002-ROOT",
            Self::TooFewChildren => "INPUT-003-SIZE",
            Self::FromStartNotComposite => "INPUT-004-FROM_START",
            Self::SegmentNotComposite => "INPUT-005-SEGMENT",
            Self::EmptyRaster => "INPUT-006-EMPTY_RASTER",
            Self::TransitionNotUnordered => "INPUT-007-UNORDERED",
            Self::DanglingTransition => "INPUT-008-DANGLING",
            Self::ToEndNotComposite => "INPUT-009-TO_END",
        }
    }

    /// Returns true for errors that concern the run context rather than
    /// the shape of the plan tree.
    #[must_use]
    pub const fn is_fatal_input(self) -> bool {
        matches!(self, Self::MissingEnvironment)
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error raised when a process input does not have the raster shape.
#[derive(Debug, Clone, Error)]
#[error("[{rule}] {message}")]
pub struct InputValidationError {
    /// The violated rule.
    pub rule: ValidationRule,
    /// Human readable diagnostic.
    pub message: String,
    /// Index of the offending child of the root composite, if any.
    pub index: Option<usize>,
    /// Optional hint for fixing the input.
    pub fix_hint: Option<String>,
}

impl InputValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(rule: ValidationRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
            index: None,
            fix_hint: None,
        }
    }

    /// Sets the offending child index.
    #[must_use]
    pub const fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Returns the diagnostic code of the violated rule.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.rule.code()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("rule".to_string(), serde_json::json!(self.rule));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(index) = self.index {
            map.insert("index".to_string(), serde_json::json!(index));
        }
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        map
    }
}

/// Error raised when an edge would close a cycle in the task graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in task graph: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// Task names forming the cycle, first name repeated at the end.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub const fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}
