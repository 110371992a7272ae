//! Structural validation of raster process inputs.
//!
//! A raster program is a composite laid out as
//! `[from_start, raster_1, transition_1, ..., raster_N, to_end]`.

use super::{CompositeInstruction, PlanNode};
use crate::context::ProcessInput;
use crate::errors::{InputValidationError, ValidationRule};
use tracing::{debug, error};

fn composite_at(
    root: &CompositeInstruction,
    index: usize,
) -> Option<&CompositeInstruction> {
    root.get(index).and_then(|node| node.as_composite())
}

/// Validates that `input` has the raster program shape.
///
/// Checks run in order and stop at the first violation. The input is never
/// modified.
pub fn validate_raster_input(input: &ProcessInput) -> Result<(), InputValidationError> {
    if input.environment.is_none() {
        return Err(InputValidationError::new(
            ValidationRule::MissingEnvironment,
            "process input has no planning environment",
        ));
    }

    let PlanNode::Composite(root) = input.instruction.as_ref() else {
        return Err(InputValidationError::new(
            ValidationRule::RootNotComposite,
            "process input instruction should be a composite",
        ));
    };

    if root.len() < 3 {
        return Err(InputValidationError::new(
            ValidationRule::TooFewChildren,
            format!(
                "raster program needs from_start, at least one raster and to_end; found {} children",
                root.len()
            ),
        ));
    }

    if composite_at(root, 0).is_none() {
        return Err(InputValidationError::new(
            ValidationRule::FromStartNotComposite,
            "from_start should be a composite",
        )
        .at(0));
    }

    let last = root.len() - 1;
    if composite_at(root, last).is_none() {
        return Err(InputValidationError::new(
            ValidationRule::ToEndNotComposite,
            "to_end should be a composite",
        )
        .at(last));
    }

    for index in 1..last {
        let Some(step) = composite_at(root, index) else {
            return Err(InputValidationError::new(
                ValidationRule::SegmentNotComposite,
                format!("child {index} should be a composite; rasters and transitions must be composites"),
            )
            .at(index));
        };

        if index % 2 == 1 {
            if step.is_empty() {
                return Err(InputValidationError::new(
                    ValidationRule::EmptyRaster,
                    format!("raster at child {index} must have at least one element"),
                )
                .at(index));
            }
        } else if step.len() > 1 && !step.is_unordered() {
            debug!(index, transition = ?step, "Rejected transition composite");
            return Err(InputValidationError::new(
                ValidationRule::TransitionNotUnordered,
                format!("transition at child {index} has multiple children but is not unordered"),
            )
            .at(index)
            .with_fix_hint(
                "check that this is not a single raster strip; the from_start composite may be missing",
            ));
        }
    }

    if root.len() % 2 == 0 {
        return Err(InputValidationError::new(
            ValidationRule::DanglingTransition,
            format!("child {} is a transition with no raster after it", last - 1),
        )
        .at(last - 1));
    }

    Ok(())
}

/// Validates `input`, logging the violated rule on failure.
pub fn check_raster_input(input: &ProcessInput) -> bool {
    match validate_raster_input(input) {
        Ok(()) => true,
        Err(err) => {
            error!(
                code = err.code(),
                index = ?err.index,
                hint = ?err.fix_hint,
                "Invalid process input: {}", err.message
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PlanningEnvironment;
    use crate::plan::{PlanInstruction, PlanInstructionKind};
    use std::sync::Arc;

    fn leaf() -> PlanInstruction {
        PlanInstruction::new(PlanInstructionKind::Linear, "RASTER")
    }

    fn group(children: usize) -> CompositeInstruction {
        (0..children).fold(CompositeInstruction::new("GROUP"), |c, _| c.with_child(leaf()))
    }

    fn input(root: impl Into<PlanNode>) -> ProcessInput {
        ProcessInput::new(Arc::new(PlanningEnvironment::new("cell")), root)
    }

    fn rule_of(input: &ProcessInput) -> ValidationRule {
        validate_raster_input(input).unwrap_err().rule
    }

    #[test]
    fn test_accepts_minimal_program() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(1))
            .with_child(group(1));
        assert!(validate_raster_input(&input(root)).is_ok());
    }

    #[test]
    fn test_accepts_multi_raster_program() {
        let transitions = CompositeInstruction::unordered("TRANSITION")
            .with_child(group(1))
            .with_child(group(1));
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(3))
            .with_child(transitions)
            .with_child(group(3))
            .with_child(group(1))
            .with_child(group(3))
            .with_child(group(1));
        assert!(check_raster_input(&input(root)));
    }

    #[test]
    fn test_rejects_missing_environment_first() {
        let input = ProcessInput::without_environment(leaf());
        assert_eq!(rule_of(&input), ValidationRule::MissingEnvironment);
    }

    #[test]
    fn test_rejects_leaf_root() {
        assert_eq!(rule_of(&input(leaf())), ValidationRule::RootNotComposite);
    }

    #[test]
    fn test_rejects_single_child() {
        let root = CompositeInstruction::new("PROGRAM").with_child(group(1));
        assert_eq!(rule_of(&input(root)), ValidationRule::TooFewChildren);
    }

    #[test]
    fn test_rejects_leaf_from_start() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(leaf())
            .with_child(group(1))
            .with_child(group(1));
        assert_eq!(rule_of(&input(root)), ValidationRule::FromStartNotComposite);
    }

    #[test]
    fn test_rejects_leaf_second_child() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(leaf())
            .with_child(group(1));
        let err = validate_raster_input(&input(root)).unwrap_err();
        assert_eq!(err.rule, ValidationRule::SegmentNotComposite);
        assert_eq!(err.index, Some(1));
    }

    #[test]
    fn test_rejects_empty_raster() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(0))
            .with_child(group(1));
        assert_eq!(rule_of(&input(root)), ValidationRule::EmptyRaster);
    }

    #[test]
    fn test_rejects_ordered_multi_child_transition() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(2))
            .with_child(group(2))
            .with_child(group(2))
            .with_child(group(1));
        let err = validate_raster_input(&input(root)).unwrap_err();
        assert_eq!(err.rule, ValidationRule::TransitionNotUnordered);
        assert!(err.message.contains("not unordered"));
        assert_eq!(err.index, Some(2));
        assert!(err.fix_hint.is_some());
    }

    #[test]
    fn test_accepts_single_child_ordered_transition() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(2))
            .with_child(group(1))
            .with_child(group(2))
            .with_child(group(1));
        assert!(validate_raster_input(&input(root)).is_ok());
    }

    #[test]
    fn test_rejects_dangling_transition() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(2))
            .with_child(group(1))
            .with_child(group(1));
        assert_eq!(rule_of(&input(root)), ValidationRule::DanglingTransition);
    }

    #[test]
    fn test_rejects_leaf_to_end() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(1))
            .with_child(leaf());
        assert_eq!(rule_of(&input(root)), ValidationRule::ToEndNotComposite);
        assert!(!check_raster_input(&input(
            CompositeInstruction::new("PROGRAM")
                .with_child(group(1))
                .with_child(group(1))
                .with_child(leaf())
        )));
    }

    #[test]
    fn test_to_end_checked_before_interior() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(leaf())
            .with_child(leaf());
        let err = validate_raster_input(&input(root)).unwrap_err();
        assert_eq!(err.rule, ValidationRule::ToEndNotComposite);
        assert_eq!(err.index, Some(2));
    }

    #[test]
    fn test_to_end_checked_before_dangling_transition() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(1))
            .with_child(group(1))
            .with_child(leaf());
        assert_eq!(rule_of(&input(root)), ValidationRule::ToEndNotComposite);
    }

    #[test]
    fn test_validation_does_not_mutate_input() {
        let root = CompositeInstruction::new("PROGRAM")
            .with_child(group(1))
            .with_child(group(1))
            .with_child(group(1));
        let input = input(root);
        let before = input.instruction.as_ref().clone();
        let _ = validate_raster_input(&input);
        assert_eq!(input.instruction.as_ref(), &before);
    }
}
