//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::StageContext;
use crate::core::StageOutput;
use crate::plan::PlanNode;
use crate::stages::Stage;

/// A mock stage that records calls and returns a configurable output.
///
/// Scripted outputs are consumed one per call; once the script runs out the
/// fallback output is returned.
#[derive(Debug)]
pub struct MockStage {
    name: String,
    output: Mutex<StageOutput>,
    script: Mutex<VecDeque<StageOutput>>,
    call_count: AtomicUsize,
    tasks: Mutex<Vec<String>>,
}

impl MockStage {
    /// Creates a new mock stage with a success output.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_output(name, StageOutput::ok())
    }

    /// Creates a mock stage that always fails with `reason`.
    #[must_use]
    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_output(name, StageOutput::fail(reason))
    }

    /// Creates a mock stage that plays `outputs` in order, then succeeds.
    #[must_use]
    pub fn scripted(name: impl Into<String>, outputs: Vec<StageOutput>) -> Self {
        let stage = Self::new(name);
        *stage.script.lock() = outputs.into();
        stage
    }

    fn with_output(name: impl Into<String>, output: StageOutput) -> Self {
        Self {
            name: name.into(),
            output: Mutex::new(output),
            script: Mutex::new(VecDeque::new()),
            call_count: AtomicUsize::new(0),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Sets the fallback output.
    pub fn set_output(&self, output: StageOutput) {
        *self.output.lock() = output;
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Returns the task names of each call, in call order.
    #[must_use]
    pub fn recorded_tasks(&self) -> Vec<String> {
        self.tasks.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.tasks.lock().clear();
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _node: &PlanNode, ctx: &StageContext) -> StageOutput {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().push(ctx.task_name().to_string());
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.output.lock().clone())
    }
}

/// A stage that always succeeds.
#[derive(Debug)]
pub struct SuccessStage {
    name: String,
}

impl SuccessStage {
    /// Creates a new success stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for SuccessStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _node: &PlanNode, _ctx: &StageContext) -> StageOutput {
        StageOutput::ok()
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    reason: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let reason = format!("{name} found no solution");
        Self { name, reason }
    }

    /// Sets the failure reason.
    #[must_use]
    pub fn with_message(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _node: &PlanNode, _ctx: &StageContext) -> StageOutput {
        StageOutput::fail(&self.reason)
    }
}

/// A stage that panics on every attempt.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a new panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::panic)]
    async fn attempt(&self, _node: &PlanNode, _ctx: &StageContext) -> StageOutput {
        panic!("{} blew up", self.name)
    }
}

/// A stage that takes time to execute.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    succeed: bool,
}

impl SlowStage {
    /// Creates a new slow stage that succeeds after `delay`.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            succeed: true,
        }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }

    /// Makes the stage fail once its delay has elapsed.
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.succeed = false;
        self
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _node: &PlanNode, _ctx: &StageContext) -> StageOutput {
        tokio::time::sleep(self.delay).await;
        if self.succeed {
            StageOutput::ok()
        } else {
            StageOutput::fail(format!("{} gave up after {:?}", self.name, self.delay))
        }
    }
}

/// A stage that succeeds with a fixed probability.
#[derive(Debug)]
pub struct RandomOutcomeStage {
    name: String,
    success_rate: f64,
    rng: Mutex<StdRng>,
}

impl RandomOutcomeStage {
    /// Creates a stage succeeding with probability `success_rate`.
    #[must_use]
    pub fn new(name: impl Into<String>, success_rate: f64) -> Self {
        Self {
            name: name.into(),
            success_rate: success_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a stage with a reproducible outcome sequence.
    #[must_use]
    pub fn seeded(name: impl Into<String>, success_rate: f64, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..Self::new(name, success_rate)
        }
    }
}

#[async_trait]
impl Stage for RandomOutcomeStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _node: &PlanNode, _ctx: &StageContext) -> StageOutput {
        let (succeed, jitter) = {
            let mut rng = self.rng.lock();
            (rng.gen_bool(self.success_rate), rng.gen_range(0..3))
        };
        if jitter > 0 {
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
        if succeed {
            StageOutput::ok()
        } else {
            StageOutput::fail("random failure")
        }
    }
}

/// A stage that appends `start:<label>` and `finish:<label>` to a shared log.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    per_task: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingStage {
    /// Creates a recording stage labelled with its own name.
    #[must_use]
    pub fn new(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            per_task: false,
            log,
        }
    }

    /// Creates a recording stage labelled with the task it runs in.
    #[must_use]
    pub fn per_task(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            per_task: true,
            log,
        }
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _node: &PlanNode, ctx: &StageContext) -> StageOutput {
        let label = if self.per_task {
            ctx.task_name()
        } else {
            self.name.as_str()
        };
        self.log.lock().push(format!("start:{label}"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.log.lock().push(format!("finish:{label}"));
        StageOutput::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PlanningEnvironment, RunContext};
    use crate::plan::{PlanInstruction, PlanInstructionKind};

    fn node() -> PlanNode {
        PlanInstruction::new(PlanInstructionKind::Linear, "RASTER").into()
    }

    fn stage_context(task: &str) -> StageContext {
        RunContext::new(Arc::new(PlanningEnvironment::new("cell"))).stage_context(task, "mock", 0)
    }

    #[tokio::test]
    async fn test_mock_stage_script() {
        let stage = MockStage::scripted("mock", vec![StageOutput::fail("first"), StageOutput::fail("second")]);

        assert!(stage.attempt(&node(), &stage_context("a")).await.is_failure());
        assert!(stage.attempt(&node(), &stage_context("b")).await.is_failure());
        assert!(stage.attempt(&node(), &stage_context("c")).await.is_success());
        assert_eq!(stage.call_count(), 3);
        assert_eq!(stage.recorded_tasks(), vec!["a", "b", "c"]);

        stage.reset();
        assert_eq!(stage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_random_stage_extremes() {
        let always = RandomOutcomeStage::seeded("always", 1.0, 7);
        let never = RandomOutcomeStage::seeded("never", 0.0, 7);
        for _ in 0..10 {
            assert!(always.attempt(&node(), &stage_context("t")).await.is_success());
            assert!(never.attempt(&node(), &stage_context("t")).await.is_failure());
        }
    }

    #[tokio::test]
    async fn test_recording_stage_per_task() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = RecordingStage::per_task("rec", log.clone());
        stage.attempt(&node(), &stage_context("raster_1")).await;
        assert_eq!(*log.lock(), vec!["start:raster_1", "finish:raster_1"]);
    }

    #[tokio::test]
    async fn test_failing_stage_message() {
        let stage = FailingStage::new("descartes").with_message("no valid IK");
        let output = stage.attempt(&node(), &stage_context("t")).await;
        assert_eq!(output.message.as_deref(), Some("no valid IK"));
    }
}
