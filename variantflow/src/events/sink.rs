//! Event sinks.

use super::PipelineEvent;
use parking_lot::RwLock;

/// Receives pipeline events. Called from the scheduler loop, so
/// implementations must not block.
pub trait EventSink: Send + Sync {
    /// Handles one event. Must never panic.
    fn emit(&self, event: &PipelineEvent);
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { run_id, roots, tasks } => {
                tracing::info!(event = event.name(), %run_id, ?roots, tasks, "Run started");
            }
            PipelineEvent::RunCompleted {
                run_id,
                success,
                executed,
                failed,
                skipped,
            } => {
                tracing::info!(event = event.name(), %run_id, success, executed, failed, skipped, "Run completed");
            }
            PipelineEvent::TaskFailed {
                task,
                failure,
                quarantined,
            } => {
                tracing::warn!(
                    event = event.name(),
                    stage = %task.stage,
                    task_id = %task.task_id,
                    kind = ?failure.as_ref().map(|f| f.kind),
                    ?quarantined,
                    "Task failed"
                );
            }
            PipelineEvent::TaskSkipped { task, upstream } => {
                tracing::warn!(event = event.name(), stage = %task.stage, task_id = %task.task_id, ?upstream, "Task skipped");
            }
            PipelineEvent::TaskSucceeded { task, duration_ms } => {
                tracing::info!(event = event.name(), stage = %task.stage, task_id = %task.task_id, ?duration_ms, "Task succeeded");
            }
            PipelineEvent::TaskAlreadyComplete(task) | PipelineEvent::TaskStarted(task) => {
                tracing::debug!(event = event.name(), stage = %task.stage, task_id = %task.task_id, kind = %task.kind);
            }
        }
    }
}

/// Keeps every event in memory, for tests and reports.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Counts events with this dotted name.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events.read().iter().filter(|e| e.name() == name).count()
    }

    /// Stages named by events with this dotted name, in emission order.
    #[must_use]
    pub fn stages(&self, name: &str) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|e| e.name() == name)
            .filter_map(|e| e.task().map(|t| t.stage.clone()))
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}
