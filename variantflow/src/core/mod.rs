//! Core value types shared by the scheduler and the executor.

mod result;
mod status;

pub use result::{FailureKind, InvocationRecord, RecordCounts, StageFailure, StageResult};
pub use status::{StageKind, TaskStatus};
