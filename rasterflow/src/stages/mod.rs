//! Stage trait and implementations.
//!
//! A stage is one planning capability, e.g. an interpolator or an
//! optimizer. The engine only ever asks a stage to attempt a plan node and
//! looks at the status of the result.

mod defaults;

pub use defaults::{default_freespace_stages, default_raster_stages, SeedCheckStage};

use crate::context::StageContext;
use crate::core::StageOutput;
use crate::plan::PlanNode;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// An ordered fallback list of stages.
pub type StageList = Vec<Arc<dyn Stage>>;

/// Trait for planning stages.
///
/// Stages are stateless from the engine's point of view and may be invoked
/// concurrently on different nodes.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Attempts to plan for `node`.
    async fn attempt(&self, node: &PlanNode, ctx: &StageContext) -> StageOutput;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&PlanNode, &StageContext) -> StageOutput + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&PlanNode, &StageContext) -> StageOutput + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&PlanNode, &StageContext) -> StageOutput + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&PlanNode, &StageContext) -> StageOutput + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, node: &PlanNode, ctx: &StageContext) -> StageOutput {
        (self.func)(node, ctx)
    }
}

/// A no-op stage that always succeeds.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _node: &PlanNode, _ctx: &StageContext) -> StageOutput {
        StageOutput::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PlanningEnvironment, RunContext};
    use crate::plan::{PlanInstruction, PlanInstructionKind};

    fn stage_context() -> StageContext {
        RunContext::new(Arc::new(PlanningEnvironment::new("cell"))).stage_context("raster_1", "test", 0)
    }

    fn node() -> PlanNode {
        PlanInstruction::new(PlanInstructionKind::Linear, "RASTER").into()
    }

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("profile_check", |node, _ctx| {
            if node.profile() == "RASTER" {
                StageOutput::ok()
            } else {
                StageOutput::fail("wrong profile")
            }
        });

        assert_eq!(stage.name(), "profile_check");
        let output = stage.attempt(&node(), &stage_context()).await;
        assert!(output.is_success());
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let stage = NoOpStage::new("noop");
        assert_eq!(stage.name(), "noop");
        assert!(stage.attempt(&node(), &stage_context()).await.is_success());
    }

    #[test]
    fn test_stage_list_is_object_safe() {
        let list: StageList = vec![Arc::new(NoOpStage::new("a")), Arc::new(NoOpStage::new("b"))];
        let names: Vec<_> = list.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
