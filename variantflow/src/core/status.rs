//! Task status and stage kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Fetches upstream data over the network.
    Download,
    /// Runs an external transformation program.
    #[default]
    Transform,
    /// Copies a finished artifact into the output tree.
    Copy,
    /// Produces no Target; only fans out to its dependencies.
    Wrapper,
    /// Part of the release assembly.
    Release,
}

impl StageKind {
    /// Returns true if failures of this kind of stage may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Download)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Transform => write!(f, "transform"),
            Self::Copy => write!(f, "copy"),
            Self::Wrapper => write!(f, "wrapper"),
            Self::Release => write!(f, "release"),
        }
    }
}

/// Where a task stands within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Targets already existed; nothing was executed.
    Complete,
    /// Executed in this run and its Targets now exist.
    Succeeded,
    /// Executed in this run and failed.
    Failed,
    /// Not executed because an upstream task failed.
    Skipped,
}

impl TaskStatus {
    /// Returns true if downstream tasks may rely on this one.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Complete | Self::Succeeded)
    }

    /// Returns true if no further transition will happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Download.to_string(), "download");
        assert_eq!(StageKind::Wrapper.to_string(), "wrapper");
        assert_eq!(StageKind::default(), StageKind::Transform);
    }

    #[test]
    fn test_only_downloads_retry() {
        assert!(StageKind::Download.is_retryable());
        assert!(!StageKind::Transform.is_retryable());
        assert!(!StageKind::Release.is_retryable());
    }

    #[test]
    fn test_task_status_predicates() {
        assert!(TaskStatus::Complete.is_done());
        assert!(TaskStatus::Succeeded.is_done());
        assert!(!TaskStatus::Failed.is_done());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_task_status_serde() {
        let json = serde_json::to_string(&TaskStatus::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
        let parsed: TaskStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(parsed, TaskStatus::Skipped);
    }
}
