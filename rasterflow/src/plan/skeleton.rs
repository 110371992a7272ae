//! Skeleton seeds: empty result containers shaped like a plan.

use super::{CompositeInstruction, PlanInstruction, PlanNode};
use std::sync::Arc;

/// The child-count structure of a plan tree.
///
/// Instructions and empty composites both have an empty shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    /// Shapes of the children, in order.
    pub children: Vec<Shape>,
}

impl Shape {
    /// Returns the total number of nodes below and including this one.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}

/// Computes the shape of a plan tree.
#[must_use]
pub fn shape(node: &PlanNode) -> Shape {
    match node {
        PlanNode::Instruction(_) => Shape::default(),
        PlanNode::Composite(composite) => Shape {
            children: composite.iter().map(|child| shape(child)).collect(),
        },
    }
}

/// Counts the planning directives anywhere in the tree.
#[must_use]
pub fn count_instructions(node: &PlanNode) -> usize {
    match node {
        PlanNode::Instruction(_) => 1,
        PlanNode::Composite(composite) => composite.iter().map(|child| count_instructions(child)).sum(),
    }
}

fn empty_composite_for(instruction: &PlanInstruction) -> CompositeInstruction {
    CompositeInstruction::new(instruction.profile.clone())
        .with_description(instruction.description.clone())
        .with_manipulator(instruction.manipulator.clone())
}

/// Copies a composite, replacing every planning directive with an empty
/// composite that inherits its profile, description and manipulator.
#[must_use]
pub fn generate_skeleton_seed(composite: &CompositeInstruction) -> CompositeInstruction {
    CompositeInstruction {
        profile: composite.profile.clone(),
        description: composite.description.clone(),
        manipulator: composite.manipulator.clone(),
        order: composite.order,
        children: composite
            .iter()
            .map(|child| Arc::new(skeleton(child)))
            .collect(),
    }
}

/// Skeleton of an arbitrary node. The result is always a composite.
#[must_use]
pub fn skeleton(node: &PlanNode) -> PlanNode {
    match node {
        PlanNode::Instruction(instruction) => PlanNode::Composite(empty_composite_for(instruction)),
        PlanNode::Composite(composite) => PlanNode::Composite(generate_skeleton_seed(composite)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{CompositeOrder, ManipulatorInfo, PlanInstructionKind};
    use pretty_assertions::assert_eq;

    fn program() -> PlanNode {
        let manipulator = ManipulatorInfo::new("arm").with_working_frame("part");
        let raster = CompositeInstruction::new("RASTER")
            .with_child(
                PlanInstruction::new(PlanInstructionKind::Linear, "PROCESS")
                    .with_description("pass 1")
                    .with_manipulator(manipulator.clone()),
            )
            .with_child(
                PlanInstruction::new(PlanInstructionKind::Linear, "PROCESS")
                    .with_description("pass 2")
                    .with_manipulator(manipulator),
            );
        let transitions = CompositeInstruction::unordered("TRANSITION")
            .with_child(CompositeInstruction::new("FREESPACE").with_child(PlanInstruction::new(
                PlanInstructionKind::Freespace,
                "FREESPACE",
            )));

        CompositeInstruction::new("PROGRAM")
            .with_child(transitions)
            .with_child(raster)
            .with_child(CompositeInstruction::new("EMPTY"))
            .into()
    }

    #[test]
    fn test_skeleton_preserves_shape() {
        let tree = program();
        let seed = skeleton(&tree);
        assert_eq!(shape(&seed), shape(&tree));
        assert_eq!(count_instructions(&seed), 0);
        assert_eq!(count_instructions(&tree), 3);
    }

    #[test]
    fn test_leaves_become_empty_composites_with_metadata() {
        let seed = skeleton(&program());
        let raster = seed.as_composite().unwrap().get(1).unwrap();
        let first = raster.as_composite().unwrap().get(0).unwrap();

        let composite = first.as_composite().expect("leaf should become a composite");
        assert!(composite.is_empty());
        assert_eq!(composite.profile, "PROCESS");
        assert_eq!(composite.description, "pass 1");
        assert_eq!(composite.manipulator.working_frame, "part");
        assert_eq!(composite.order, CompositeOrder::Ordered);
    }

    #[test]
    fn test_composite_metadata_is_copied() {
        let seed = skeleton(&program());
        let transitions = seed.as_composite().unwrap().get(0).unwrap();
        assert_eq!(transitions.profile(), "TRANSITION");
        assert!(transitions.as_composite().unwrap().is_unordered());
    }

    #[test]
    fn test_skeleton_is_idempotent_in_shape() {
        let once = skeleton(&program());
        let twice = skeleton(&once);
        assert_eq!(shape(&once), shape(&twice));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let tree = program();
        let before = tree.clone();
        let _ = skeleton(&tree);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_single_instruction_skeleton() {
        let node: PlanNode = PlanInstruction::new(PlanInstructionKind::Start, "START").into();
        let seed = skeleton(&node);
        assert_eq!(seed.profile(), "START");
        assert_eq!(seed.child_count(), 0);
        assert_eq!(shape(&seed).node_count(), 1);
    }
}
