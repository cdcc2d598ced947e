//! Testing utilities for variantflow pipelines.
//!
//! This module provides:
//! - Fake process invokers, downloaders and executors
//! - A temporary workspace fixture with matching parameters

mod fixtures;
mod mocks;

pub use fixtures::{tsv_table, TestWorkspace};
pub use mocks::{FlakyDownloader, RecordingExecutor, ScriptedInvoker};
