//! Shared pipeline outcome written from concurrent chain callbacks.

use super::TaskStatus;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Aggregate outcome of one pipeline run.
///
/// Chain callbacks record into this from worker threads while the run is in
/// flight. The final verdict is only computed by [`PipelineOutcome::finish`],
/// which the executor calls after every task has been joined, so readers
/// never observe a half-written result.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    failed: AtomicBool,
    succeeded: AtomicUsize,
    success: AtomicBool,
    branches: DashMap<String, TaskStatus>,
}

impl PipelineOutcome {
    /// Creates a new outcome in the "unknown" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the "unknown/failure" state at the start of a run.
    pub fn reset(&self) {
        self.failed.store(false, Ordering::SeqCst);
        self.succeeded.store(0, Ordering::SeqCst);
        self.success.store(false, Ordering::SeqCst);
        self.branches.clear();
    }

    /// Records that a branch reached its success terminal.
    pub fn record_success(&self, branch: &str) {
        self.branches.insert(branch.to_string(), TaskStatus::Success);
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    /// Records that a branch exhausted its stages or was cancelled.
    pub fn record_failure(&self, branch: &str, status: TaskStatus) {
        let status = if status.is_failure() {
            status
        } else {
            TaskStatus::Failure
        };
        self.branches.insert(branch.to_string(), status);
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Computes the final verdict once all `expected` branches have completed.
    ///
    /// Success requires no recorded failure and a success from every branch.
    pub fn finish(&self, expected: usize) -> bool {
        let success = !self.failed.load(Ordering::SeqCst)
            && self.succeeded.load(Ordering::SeqCst) == expected;
        self.success.store(success, Ordering::SeqCst);
        success
    }

    /// Returns the verdict of the last finished run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success.load(Ordering::SeqCst)
    }

    /// Returns true if any branch has recorded a failure in the current run.
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of branches that reached success.
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Returns the recorded status of a branch.
    #[must_use]
    pub fn branch_status(&self, branch: &str) -> Option<TaskStatus> {
        self.branches.get(branch).map(|entry| *entry.value())
    }

    /// Returns the names of failed branches, sorted.
    #[must_use]
    pub fn failed_branches(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .branches
            .iter()
            .filter(|entry| entry.value().is_failure())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unknown_until_finished() {
        let outcome = PipelineOutcome::new();
        outcome.record_success("raster_1");
        assert!(!outcome.is_success());

        assert!(outcome.finish(1));
        assert!(outcome.is_success());
    }

    #[test]
    fn test_failure_wins_over_late_success() {
        let outcome = PipelineOutcome::new();
        outcome.record_failure("raster_1", TaskStatus::Failure);
        outcome.record_success("raster_3");

        assert!(!outcome.finish(1));
        assert_eq!(outcome.failed_branches(), vec!["raster_1".to_string()]);
    }

    #[test]
    fn test_missing_branch_is_not_success() {
        let outcome = PipelineOutcome::new();
        outcome.record_success("raster_1");
        assert!(!outcome.finish(2));
    }

    #[test]
    fn test_reset_clears_previous_run() {
        let outcome = PipelineOutcome::new();
        outcome.record_failure("to_end", TaskStatus::Cancelled);
        outcome.finish(1);

        outcome.reset();
        assert!(!outcome.has_failure());
        assert_eq!(outcome.succeeded_count(), 0);
        assert!(outcome.branch_status("to_end").is_none());
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_non_failure_status_recorded_as_failure() {
        let outcome = PipelineOutcome::new();
        outcome.record_failure("from_start", TaskStatus::Success);
        assert_eq!(outcome.branch_status("from_start"), Some(TaskStatus::Failure));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let outcome = Arc::new(PipelineOutcome::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let outcome = outcome.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        outcome.record_success(&format!("branch_{t}_{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(outcome.succeeded_count(), 2000);
        assert!(outcome.finish(2000));
    }
}
