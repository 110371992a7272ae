//! Core domain model types for rasterflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Task status enum
//! - Stage output type with factory methods
//! - The shared pipeline outcome accumulator

mod outcome;
mod output;
mod status;

pub use outcome::PipelineOutcome;
pub use output::StageOutput;
pub use status::TaskStatus;
