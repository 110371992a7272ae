//! Plan tree nodes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The manipulator and frames a plan node targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManipulatorInfo {
    /// Manipulator (kinematic group) name.
    #[serde(default)]
    pub manipulator: String,
    /// Frame the waypoints are expressed in.
    #[serde(default)]
    pub working_frame: String,
    /// Tool center point frame.
    #[serde(default)]
    pub tcp_frame: String,
}

impl ManipulatorInfo {
    /// Creates manipulator info for the named manipulator.
    #[must_use]
    pub fn new(manipulator: impl Into<String>) -> Self {
        Self {
            manipulator: manipulator.into(),
            ..Self::default()
        }
    }

    /// Sets the working frame.
    #[must_use]
    pub fn with_working_frame(mut self, frame: impl Into<String>) -> Self {
        self.working_frame = frame.into();
        self
    }

    /// Sets the tool center point frame.
    #[must_use]
    pub fn with_tcp_frame(mut self, frame: impl Into<String>) -> Self {
        self.tcp_frame = frame.into();
        self
    }

    /// Returns true if no field has been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manipulator.is_empty() && self.working_frame.is_empty() && self.tcp_frame.is_empty()
    }
}

/// Whether the children of a composite have caller-visible order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOrder {
    /// Children must be executed in sequence.
    #[default]
    Ordered,
    /// Children are mutually independent.
    Unordered,
    /// Children are ordered but the sequence may be reversed.
    OrderedAndReversible,
}

/// The motion type requested by a planning directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanInstructionKind {
    /// The start state of a program.
    Start,
    /// Unconstrained motion to the target.
    #[default]
    Freespace,
    /// Cartesian straight-line motion.
    Linear,
    /// Cartesian arc motion.
    Circular,
}

/// An atomic planning directive, e.g. "move linearly to X".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanInstruction {
    /// Requested motion type.
    #[serde(default)]
    pub kind: PlanInstructionKind,
    /// Planner profile name.
    #[serde(default)]
    pub profile: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Targeted manipulator.
    #[serde(default)]
    pub manipulator: ManipulatorInfo,
    /// Opaque waypoint payload, interpreted only by stages.
    #[serde(default)]
    pub target: serde_json::Value,
}

impl PlanInstruction {
    /// Creates a directive of the given kind with the given profile.
    #[must_use]
    pub fn new(kind: PlanInstructionKind, profile: impl Into<String>) -> Self {
        Self {
            kind,
            profile: profile.into(),
            description: String::new(),
            manipulator: ManipulatorInfo::default(),
            target: serde_json::Value::Null,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the targeted manipulator.
    #[must_use]
    pub fn with_manipulator(mut self, manipulator: ManipulatorInfo) -> Self {
        self.manipulator = manipulator;
        self
    }

    /// Sets the waypoint payload.
    #[must_use]
    pub fn with_target(mut self, target: serde_json::Value) -> Self {
        self.target = target;
        self
    }
}

/// An ordered or unordered group of plan nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeInstruction {
    /// Planner profile name.
    #[serde(default)]
    pub profile: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Targeted manipulator.
    #[serde(default)]
    pub manipulator: ManipulatorInfo,
    /// Child ordering semantics.
    #[serde(default)]
    pub order: CompositeOrder,
    /// Child nodes, shared so tasks can hold sub-trees without copying.
    #[serde(default)]
    pub children: Vec<Arc<PlanNode>>,
}

impl CompositeInstruction {
    /// Creates an empty ordered composite with the given profile.
    #[must_use]
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            ..Self::default()
        }
    }

    /// Creates an empty unordered composite with the given profile.
    #[must_use]
    pub fn unordered(profile: impl Into<String>) -> Self {
        Self::new(profile).with_order(CompositeOrder::Unordered)
    }

    /// Sets the child ordering.
    #[must_use]
    pub const fn with_order(mut self, order: CompositeOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the targeted manipulator.
    #[must_use]
    pub fn with_manipulator(mut self, manipulator: ManipulatorInfo) -> Self {
        self.manipulator = manipulator;
        self
    }

    /// Appends a child node.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<PlanNode>) -> Self {
        self.push(child);
        self
    }

    /// Appends a child node in place.
    pub fn push(&mut self, child: impl Into<PlanNode>) {
        self.children.push(Arc::new(child.into()));
    }

    /// Returns the number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns true if there are no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns true if the children have no relative-order significance.
    #[must_use]
    pub fn is_unordered(&self) -> bool {
        self.order == CompositeOrder::Unordered
    }

    /// Returns the child at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<PlanNode>> {
        self.children.get(index)
    }

    /// Iterates over the children.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PlanNode>> {
        self.children.iter()
    }
}

/// A node of the plan tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanNode {
    /// An atomic planning directive.
    Instruction(PlanInstruction),
    /// A group of child nodes.
    Composite(CompositeInstruction),
}

impl PlanNode {
    /// Returns the composite if this node is one.
    #[must_use]
    pub const fn as_composite(&self) -> Option<&CompositeInstruction> {
        match self {
            Self::Composite(composite) => Some(composite),
            Self::Instruction(_) => None,
        }
    }

    /// Returns the instruction if this node is one.
    #[must_use]
    pub const fn as_instruction(&self) -> Option<&PlanInstruction> {
        match self {
            Self::Instruction(instruction) => Some(instruction),
            Self::Composite(_) => None,
        }
    }

    /// Returns true if this node is a composite.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// Returns the profile name.
    #[must_use]
    pub fn profile(&self) -> &str {
        match self {
            Self::Instruction(instruction) => &instruction.profile,
            Self::Composite(composite) => &composite.profile,
        }
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Instruction(instruction) => &instruction.description,
            Self::Composite(composite) => &composite.description,
        }
    }

    /// Returns the targeted manipulator.
    #[must_use]
    pub const fn manipulator(&self) -> &ManipulatorInfo {
        match self {
            Self::Instruction(instruction) => &instruction.manipulator,
            Self::Composite(composite) => &composite.manipulator,
        }
    }

    /// Returns the number of direct children (zero for instructions).
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.as_composite().map_or(0, CompositeInstruction::len)
    }
}

impl From<PlanInstruction> for PlanNode {
    fn from(instruction: PlanInstruction) -> Self {
        Self::Instruction(instruction)
    }
}

impl From<CompositeInstruction> for PlanNode {
    fn from(composite: CompositeInstruction) -> Self {
        Self::Composite(composite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn linear(description: &str) -> PlanInstruction {
        PlanInstruction::new(PlanInstructionKind::Linear, "RASTER").with_description(description)
    }

    #[test]
    fn test_composite_builder() {
        let composite = CompositeInstruction::unordered("TRANSITION")
            .with_description("transitions")
            .with_child(linear("a"))
            .with_child(linear("b"));

        assert_eq!(composite.len(), 2);
        assert!(composite.is_unordered());
        assert_eq!(composite.get(1).unwrap().description(), "b");
    }

    #[test]
    fn test_default_order_is_ordered() {
        let composite = CompositeInstruction::new("RASTER");
        assert_eq!(composite.order, CompositeOrder::Ordered);
        assert!(!composite.is_unordered());
    }

    #[test]
    fn test_node_accessors() {
        let manipulator = ManipulatorInfo::new("manipulator").with_tcp_frame("tool0");
        let node: PlanNode = linear("segment").with_manipulator(manipulator.clone()).into();

        assert!(!node.is_composite());
        assert!(node.as_composite().is_none());
        assert_eq!(node.profile(), "RASTER");
        assert_eq!(node.manipulator(), &manipulator);
        assert_eq!(node.child_count(), 0);
    }

    #[test]
    fn test_node_serialization_is_tagged() {
        let node: PlanNode = CompositeInstruction::new("FREESPACE")
            .with_child(PlanInstruction::new(PlanInstructionKind::Freespace, "FREESPACE"))
            .into();

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "composite");
        assert_eq!(json["children"][0]["type"], "instruction");
        assert_eq!(json["children"][0]["kind"], "freespace");

        let parsed: PlanNode = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let node: PlanNode = serde_json::from_str(
            r#"{"type": "composite", "profile": "RASTER", "children": [{"type": "instruction"}]}"#,
        )
        .unwrap();

        let composite = node.as_composite().unwrap();
        assert_eq!(composite.order, CompositeOrder::Ordered);
        assert_eq!(
            composite.get(0).unwrap().as_instruction().unwrap().kind,
            PlanInstructionKind::Freespace
        );
    }
}
