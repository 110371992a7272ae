//! Built-in stage lists used when a role is not configured.

use super::{Stage, StageList};
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::plan::{count_instructions, shape, skeleton, PlanNode};
use async_trait::async_trait;
use std::sync::Arc;

/// Succeeds when the node holds at least one planning directive.
///
/// Reports the node count of the node's skeleton seed as `seed_nodes`.
#[derive(Debug, Clone)]
pub struct SeedCheckStage {
    name: String,
}

impl SeedCheckStage {
    /// Creates a new seed check stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for SeedCheckStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, node: &PlanNode, _ctx: &StageContext) -> StageOutput {
        if count_instructions(node) == 0 {
            return StageOutput::fail(format!(
                "'{}' contains no planning directives",
                node.description()
            ));
        }
        let seed = skeleton(node);
        StageOutput::ok_with("seed_nodes", serde_json::json!(shape(&seed).node_count()))
    }
}

/// Default stage list for transitions and brackets.
#[must_use]
pub fn default_freespace_stages() -> StageList {
    vec![Arc::new(SeedCheckStage::new("freespace_seed_check"))]
}

/// Default stage list for rasters.
#[must_use]
pub fn default_raster_stages() -> StageList {
    vec![Arc::new(SeedCheckStage::new("raster_seed_check"))]
}
