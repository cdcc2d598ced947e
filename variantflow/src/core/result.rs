//! Stage results: the explicit outcome value of one task execution.

use super::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why a stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A network fetch failed on every attempt.
    Download,
    /// A declared output is missing or has no content.
    EmptyOutput,
    /// Output record count does not match input minus removed.
    ValidationMismatch,
    /// An external program could not run or reported an error.
    ExternalTool,
    /// A required parameter was not set.
    Configuration,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "DownloadFailure"),
            Self::EmptyOutput => write!(f, "EmptyOutputFailure"),
            Self::ValidationMismatch => write!(f, "ValidationMismatchFailure"),
            Self::ExternalTool => write!(f, "ExternalToolFailure"),
            Self::Configuration => write!(f, "ConfigurationFailure"),
        }
    }
}

/// A tagged stage failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
    /// The artifact concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StageFailure {
    /// Creates a new failure.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    /// Attaches the artifact path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Record counts checked by the validation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    /// Body rows in the input table.
    pub input: usize,
    /// Body rows in the output table.
    pub output: usize,
    /// Rows the transformation reported as removed.
    pub removed: usize,
}

impl RecordCounts {
    /// Returns true if `output == input - removed`.
    #[must_use]
    pub const fn holds(&self) -> bool {
        self.input >= self.removed && self.output == self.input - self.removed
    }
}

/// Captured run of one external program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Program that was run.
    pub program: String,
    /// Arguments passed.
    pub args: Vec<String>,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Captured standard output (empty when redirected to a file).
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl InvocationRecord {
    /// Returns true if the exit code was nonzero or the process was killed.
    #[must_use]
    pub const fn exited_abnormally(&self) -> bool {
        !matches!(self.exit_code, Some(0))
    }
}

/// Outcome of one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Task identity.
    pub task_id: String,
    /// Stage name.
    pub stage: String,
    /// Final status.
    pub status: TaskStatus,
    /// Failure details when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    /// External programs run by the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<InvocationRecord>,
    /// Counts checked by the validation gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_counts: Option<RecordCounts>,
    /// Artifacts renamed to `FAILED_...`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quarantined: Vec<PathBuf>,
    /// Download attempts made, summed over every fetch.
    #[serde(default)]
    pub download_attempts: usize,
    /// Non-fatal problems such as nonzero exit codes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution ended.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// Starts a result for a task that is about to run.
    #[must_use]
    pub fn started(task_id: impl Into<String>, stage: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            stage: stage.into(),
            status: TaskStatus::Running,
            failure: None,
            invocations: Vec::new(),
            record_counts: None,
            quarantined: Vec::new(),
            download_attempts: 0,
            warnings: Vec::new(),
            started_at: now,
            ended_at: now,
        }
    }

    /// Marks the result succeeded.
    #[must_use]
    pub fn succeed(mut self) -> Self {
        self.status = TaskStatus::Succeeded;
        self.ended_at = Utc::now();
        self
    }

    /// Marks the result failed.
    #[must_use]
    pub fn fail(mut self, failure: StageFailure) -> Self {
        self.status = TaskStatus::Failed;
        self.failure = Some(failure);
        self.ended_at = Utc::now();
        self
    }

    /// Records a non-fatal warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    /// Returns the failure kind, if failed.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}
