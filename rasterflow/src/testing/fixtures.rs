//! Plan-tree fixtures for tests and benches.

use crate::context::{PlanningEnvironment, ProcessInput};
use crate::plan::{CompositeInstruction, PlanInstruction, PlanInstructionKind, PlanNode};
use std::sync::Arc;

/// Number of linear moves in each fixture raster.
pub const RASTER_MOVES: usize = 3;

/// Returns the environment every fixture runs against.
#[must_use]
pub fn test_environment() -> Arc<PlanningEnvironment> {
    Arc::new(PlanningEnvironment::new("test_cell").with_revision(1))
}

/// Wraps a plan tree in a process input bound to [`test_environment`].
#[must_use]
pub fn process_input(tree: impl Into<PlanNode>) -> ProcessInput {
    ProcessInput::new(test_environment(), tree)
}

fn freespace_segment(profile: &str) -> CompositeInstruction {
    CompositeInstruction::new(profile)
        .with_child(PlanInstruction::new(PlanInstructionKind::Freespace, "FREESPACE"))
}

fn raster_segment(index: usize) -> CompositeInstruction {
    (0..RASTER_MOVES).fold(
        CompositeInstruction::new("RASTER").with_description(format!("raster {index}")),
        |raster, step| {
            raster.with_child(
                PlanInstruction::new(PlanInstructionKind::Linear, "RASTER")
                    .with_target(serde_json::json!({ "raster": index, "step": step })),
            )
        },
    )
}

/// Builds a well-formed raster program with `rasters` rasters and
/// `transition_steps` unordered steps between each neighbouring pair.
///
/// Child indices follow the usual layout: rasters at odd positions,
/// transitions at even interior positions, brackets at both ends.
#[must_use]
pub fn raster_program(rasters: usize, transition_steps: usize) -> CompositeInstruction {
    let mut program = CompositeInstruction::new("PROGRAM").with_description("raster program");
    program.push(freespace_segment("FROM_START"));
    for index in 0..rasters {
        if index > 0 {
            let transition = (0..transition_steps).fold(
                CompositeInstruction::unordered("TRANSITION"),
                |transition, _| transition.with_child(freespace_segment("TRANSITION")),
            );
            program.push(transition);
        }
        program.push(raster_segment(index + 1));
    }
    program.push(freespace_segment("TO_END"));
    program
}
