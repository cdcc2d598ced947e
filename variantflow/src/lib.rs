//! # Variantflow
//!
//! A dependency-driven pipeline engine that assembles versioned
//! genomic-variant releases.
//!
//! Variantflow provides:
//!
//! - **Stages as data**: every step is a [`pipeline::StageDescriptor`] row
//!   interpreted by one executor
//! - **File-based completion**: a task is done when its Targets exist, so
//!   re-running a finished pipeline executes nothing
//! - **Branch-local failures**: a failed stage skips its dependents and
//!   nothing else
//! - **Record-count gates** and quarantine of empty or rejected artifacts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use variantflow::prelude::*;
//!
//! let catalog = Arc::new(standard_catalog()?);
//! let settings = load_settings(None, None)?;
//! let executor = Arc::new(DescriptorExecutor::system(&settings));
//!
//! let report = Scheduler::new(catalog, executor)
//!     .with_settings(&settings)
//!     .run(&[RUN_ALL], Arc::new(settings.params.clone()))
//!     .await?;
//! assert!(report.success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod catalog;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod invoke;
pub mod observability;
pub mod pipeline;
pub mod quarantine;
pub mod release;
pub mod sources;
pub mod target;
pub mod testing;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::catalog::{standard_catalog, RUN_ALL};
    pub use crate::config::{load_settings, EngineSettings, ParamContext, ParamOverrides};
    pub use crate::core::{FailureKind, StageFailure, StageKind, StageResult, TaskStatus};
    pub use crate::errors::{
        ContractErrorInfo, PipelineValidationError, TemplateError, VariantflowError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, PipelineEvent};
    pub use crate::invoke::{
        DescriptorExecutor, Downloader, HttpDownloader, ProcessInvoker, StageExecutor,
        SystemProcessInvoker,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        CommandTemplate, Dependency, FailureMode, FetchSpec, GraphBuilder, OutputSpec,
        RetryConfig, RunReport, Scheduler, StageAction, StageCatalog, StageDescriptor,
        TaskGraph, TaskId, ValidationSpec,
    };
    pub use crate::target::{CheckpointStore, FsCheckpointStore, InMemoryCheckpointStore, Target};
    pub use crate::validation::ValidationGate;
    pub use std::sync::Arc;
}
