//! Structured logging setup and timing helpers.

mod tracing;

pub use self::tracing::{init_tracing, task_span, LogFormat, SpanTimer};
