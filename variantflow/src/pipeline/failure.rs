//! Failure tolerance for DAG execution.
//!
//! The default mode records a failure and keeps running every branch that
//! does not depend on the failed task.

use super::resolve::TaskId;
use crate::core::{FailureKind, StageFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// How to handle task failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Record the failure, skip its dependents, continue unrelated branches.
    #[default]
    ContinueOnFailure,
    /// Start nothing new after the first failure.
    FailFast,
}

/// Record of a task failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Task identity.
    pub task_id: TaskId,
    /// Stage name.
    pub stage: String,
    /// Failure category.
    pub kind: FailureKind,
    /// Error message.
    pub message: String,
    /// The artifact concerned (quarantined or missing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a record from a stage failure.
    #[must_use]
    pub fn new(task_id: TaskId, stage: impl Into<String>, failure: &StageFailure) -> Self {
        Self {
            task_id,
            stage: stage.into(),
            kind: failure.kind,
            message: failure.message.clone(),
            path: failure.path.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Summary of a run's outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Tasks in the resolved graph.
    pub total_tasks: usize,
    /// Tasks whose Targets already existed.
    pub already_complete: usize,
    /// Tasks executed successfully in this run.
    pub succeeded: usize,
    /// Tasks that failed.
    pub failed: usize,
    /// Tasks skipped because of an upstream failure.
    pub skipped: usize,
    /// Failure records, in the order they happened.
    pub failures: Vec<FailureRecord>,
}

impl FailureSummary {
    /// Returns true if any failures occurred.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Fraction of tasks that are done (complete or succeeded).
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        (self.already_complete + self.succeeded) as f64 / self.total_tasks as f64
    }
}

/// Collects failures during execution.
#[derive(Debug, Default)]
pub struct FailureCollector {
    /// Failure mode.
    pub mode: FailureMode,
    failures: Vec<FailureRecord>,
    failed: HashSet<TaskId>,
    skipped: HashSet<TaskId>,
    succeeded: HashSet<TaskId>,
    already_complete: HashSet<TaskId>,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Records a task failure.
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failed.insert(record.task_id.clone());
        self.failures.push(record);
    }

    /// Records a successful execution.
    pub fn record_success(&mut self, task: &TaskId) {
        self.succeeded.insert(task.clone());
    }

    /// Records a task that was already complete.
    pub fn record_complete(&mut self, task: &TaskId) {
        self.already_complete.insert(task.clone());
    }

    /// Records a skipped task.
    pub fn record_skip(&mut self, task: &TaskId) {
        self.skipped.insert(task.clone());
    }

    /// Returns true if the task has failed.
    #[must_use]
    pub fn has_failed(&self, task: &TaskId) -> bool {
        self.failed.contains(task)
    }

    /// Returns true if no new task should be started.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        match self.mode {
            FailureMode::FailFast => !self.failures.is_empty(),
            FailureMode::ContinueOnFailure => false,
        }
    }

    /// Returns true if a task with these dependencies may run.
    #[must_use]
    pub fn can_run(&self, dependencies: &[TaskId]) -> bool {
        !self.should_stop()
            && !dependencies
                .iter()
                .any(|dep| self.failed.contains(dep) || self.skipped.contains(dep))
    }

    /// Creates a summary of the execution.
    #[must_use]
    pub fn summary(&self, total_tasks: usize) -> FailureSummary {
        FailureSummary {
            total_tasks,
            already_complete: self.already_complete.len(),
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
            skipped: self.skipped.len(),
            failures: self.failures.clone(),
        }
    }

    /// Returns all failures.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamContext;

    fn id(stage: &str) -> TaskId {
        TaskId::new(stage, &ParamContext::default())
    }

    fn failure() -> StageFailure {
        StageFailure::new(FailureKind::EmptyOutput, "empty").with_path("/out/x")
    }

    #[test]
    fn test_continue_on_failure_blocks_only_dependents() {
        let mut collector = FailureCollector::new(FailureMode::ContinueOnFailure);
        collector.record_failure(FailureRecord::new(id("a"), "a", &failure()));

        assert!(collector.has_failed(&id("a")));
        assert!(!collector.can_run(&[id("a")]));
        assert!(collector.can_run(&[id("b")]));
        assert!(!collector.should_stop());
    }

    #[test]
    fn test_skips_propagate() {
        let mut collector = FailureCollector::default();
        collector.record_skip(&id("b"));
        assert!(!collector.can_run(&[id("b")]));
    }

    #[test]
    fn test_fail_fast_stops() {
        let mut collector = FailureCollector::new(FailureMode::FailFast);
        assert!(collector.can_run(&[]));
        collector.record_failure(FailureRecord::new(id("a"), "a", &failure()));
        assert!(collector.should_stop());
        assert!(!collector.can_run(&[]));
    }

    #[test]
    fn test_summary() {
        let mut collector = FailureCollector::default();
        collector.record_complete(&id("a"));
        collector.record_success(&id("b"));
        collector.record_failure(FailureRecord::new(id("c"), "c", &failure()));
        collector.record_skip(&id("d"));

        let summary = collector.summary(4);
        assert_eq!(summary.already_complete, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.has_failures());
        assert!((summary.success_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.failures[0].path, Some(PathBuf::from("/out/x")));
    }
}
