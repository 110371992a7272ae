//! The plan tree and the pure operations over it.
//!
//! This module provides:
//! - Plan tree node types (`PlanNode`, instructions and composites)
//! - Structural validation of raster programs
//! - Skeleton seed generation

mod node;
mod skeleton;
mod validation;

pub use node::{
    CompositeInstruction, CompositeOrder, ManipulatorInfo, PlanInstruction, PlanInstructionKind,
    PlanNode,
};
pub use skeleton::{count_instructions, generate_skeleton_seed, shape, skeleton, Shape};
pub use validation::{check_raster_input, validate_raster_input};
