//! # Rasterflow
//!
//! Task-graph orchestration for raster motion-planning programs.
//!
//! A raster program is a plan tree laid out as
//! `[from_start, raster, transition, raster, ..., raster, to_end]`.
//! Rasterflow validates that shape, turns every segment into a failure chain
//! (try planner stages in order until one succeeds) and runs the chains as a
//! dependency graph:
//!
//! - **Rasters** are independent and run in parallel
//! - **Transitions** wait only for the two rasters they connect
//! - **Brackets** (`from_start`, `to_end`) wait for the first and last raster
//!
//! A run succeeds only if every chain does. Runs can be cancelled through
//! [`ProcessManager::terminate`](process::ProcessManager::terminate) or a
//! timeout.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rasterflow::prelude::*;
//!
//! let mut pm = RasterProcessManager::new()
//!     .with_raster_stages(vec![Arc::new(MyInterpolator::new())])
//!     .with_freespace_stages(vec![Arc::new(MyFreespacePlanner::new())]);
//!
//! if pm.init(ProcessInput::new(environment, program)) {
//!     let ok = pm.execute().await;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod graph;
pub mod observability;
pub mod plan;
pub mod process;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancelReason, CancellationToken};
    pub use crate::context::{PlanningEnvironment, ProcessInput, RunContext, StageContext};
    pub use crate::core::{PipelineOutcome, StageOutput, TaskStatus};
    pub use crate::errors::{
        CycleDetectedError, InputValidationError, RasterflowError, ValidationRule,
    };
    pub use crate::events::{
        CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PlanningEvent,
    };
    pub use crate::graph::{
        ChainReport, FailureChain, FailureChainBuilder, TaskGraph, TaskKind, TaskReport,
    };
    pub use crate::observability::init_tracing;
    pub use crate::plan::{
        check_raster_input, generate_skeleton_seed, skeleton, validate_raster_input,
        CompositeInstruction, CompositeOrder, PlanInstruction, PlanInstructionKind, PlanNode,
    };
    pub use crate::process::{
        ExecutionSummary, ProcessManager, ProcessManagerConfig, RasterProcessManager,
    };
    pub use crate::stages::{FnStage, NoOpStage, Stage, StageList};
}
