//! Testing utilities for rasterflow.
//!
//! This module provides:
//! - Mock stages with scripted, slow, random and panicking behaviour
//! - Plan-tree fixtures shaped like real raster programs

mod fixtures;
mod mocks;

pub use fixtures::{process_input, raster_program, test_environment, RASTER_MOVES};
pub use mocks::{
    FailingStage, MockStage, PanickingStage, RandomOutcomeStage, RecordingStage, SlowStage,
    SuccessStage,
};
