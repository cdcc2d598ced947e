//! Pipeline declaration and execution.
//!
//! This module provides:
//! - Stage descriptors and the validated stage table
//! - Graph resolution into concrete tasks
//! - `{placeholder}` template rendering
//! - The dependency-driven scheduler
//! - Download retry and failure tolerance

mod builder;
pub mod descriptor;
mod failure;
mod resolve;
mod retry;
mod scheduler;
pub mod template;


pub use builder::{GraphBuilder, StageCatalog};
pub use descriptor::{
    CommandTemplate, Dependency, DiffSpec, FetchSpec, OutputSpec, PathTemplate, StageAction,
    StageDescriptor, ValidationSpec,
};
pub use failure::{FailureCollector, FailureMode, FailureRecord, FailureSummary};
pub use resolve::{TaskGraph, TaskId, TaskInstance};
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryOutcome};
pub use scheduler::{PlannedTask, RunReport, Scheduler};
pub use template::TemplateScope;
