//! Run and task lifecycle events.
//!
//! The scheduler reports every task transition as a [`PipelineEvent`] to an
//! [`EventSink`]. Sinks never fail the run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink};

use crate::core::{StageFailure, StageKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A run was started.
pub const RUN_STARTED: &str = "run.started";
/// A run finished, successfully or not.
pub const RUN_COMPLETED: &str = "run.completed";
/// A task's Targets already existed.
pub const TASK_ALREADY_COMPLETE: &str = "task.already_complete";
/// A task began executing.
pub const TASK_STARTED: &str = "task.started";
/// A task executed and its Targets exist.
pub const TASK_SUCCEEDED: &str = "task.succeeded";
/// A task failed.
pub const TASK_FAILED: &str = "task.failed";
/// A task was skipped after an upstream failure.
pub const TASK_SKIPPED: &str = "task.skipped";

/// The task an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    /// Task identity.
    pub task_id: String,
    /// Stage name.
    pub stage: String,
    /// Stage kind.
    pub kind: StageKind,
}

/// One transition of a run or of a task in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Resolution finished and execution is about to begin.
    RunStarted {
        /// Run identity.
        run_id: Uuid,
        /// Requested root stages.
        roots: Vec<String>,
        /// Resolved task count.
        tasks: usize,
    },
    /// Every needed task has finished, failed or been skipped.
    RunCompleted {
        /// Run identity.
        run_id: Uuid,
        /// No task failed or was skipped.
        success: bool,
        /// Tasks executed in this run.
        executed: usize,
        /// Failed tasks.
        failed: usize,
        /// Skipped tasks.
        skipped: usize,
    },
    /// The task's Targets existed before the run.
    TaskAlreadyComplete(TaskRef),
    /// The task was handed to the executor.
    TaskStarted(TaskRef),
    /// The task ran and its Targets are confirmed. Wrappers report no duration.
    TaskSucceeded {
        /// The task.
        task: TaskRef,
        /// Execution time.
        duration_ms: Option<i64>,
    },
    /// The task ran and failed.
    TaskFailed {
        /// The task.
        task: TaskRef,
        /// Why it failed.
        failure: Option<StageFailure>,
        /// Artifacts renamed aside.
        quarantined: Vec<PathBuf>,
    },
    /// The task was not started because a task it depends on failed.
    TaskSkipped {
        /// The task.
        task: TaskRef,
        /// The failed upstream task, unless the run stopped early.
        upstream: Option<String>,
    },
}

impl PipelineEvent {
    /// The dotted event name, e.g. `task.failed`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => RUN_STARTED,
            Self::RunCompleted { .. } => RUN_COMPLETED,
            Self::TaskAlreadyComplete(_) => TASK_ALREADY_COMPLETE,
            Self::TaskStarted(_) => TASK_STARTED,
            Self::TaskSucceeded { .. } => TASK_SUCCEEDED,
            Self::TaskFailed { .. } => TASK_FAILED,
            Self::TaskSkipped { .. } => TASK_SKIPPED,
        }
    }

    /// The task concerned, for task events.
    #[must_use]
    pub const fn task(&self) -> Option<&TaskRef> {
        match self {
            Self::RunStarted { .. } | Self::RunCompleted { .. } => None,
            Self::TaskAlreadyComplete(task) | Self::TaskStarted(task) => Some(task),
            Self::TaskSucceeded { task, .. }
            | Self::TaskFailed { task, .. }
            | Self::TaskSkipped { task, .. } => Some(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureKind;
    use pretty_assertions::assert_eq;

    fn task() -> TaskRef {
        TaskRef {
            task_id: "esp_sort-1a2b".into(),
            stage: "esp_sort".into(),
            kind: StageKind::Transform,
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(PipelineEvent::TaskStarted(task()).name(), TASK_STARTED);
        let skipped = PipelineEvent::TaskSkipped {
            task: task(),
            upstream: Some("esp_concat-1a2b".into()),
        };
        assert_eq!(skipped.name(), TASK_SKIPPED);
        assert_eq!(skipped.task().map(|t| t.stage.as_str()), Some("esp_sort"));
    }

    #[test]
    fn test_failed_event_serializes_with_tag() {
        let event = PipelineEvent::TaskFailed {
            task: task(),
            failure: Some(StageFailure::new(FailureKind::EmptyOutput, "no records")),
            quarantined: vec![PathBuf::from("/w/FAILED_2024-06-01T00:00:00Z_esp.vcf")],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "task_failed");
        assert_eq!(json["task"]["stage"], "esp_sort");
        assert_eq!(json["failure"]["kind"], "empty_output");
    }
}
