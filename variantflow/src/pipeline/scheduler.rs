//! Dependency-driven scheduler.
//!
//! A run resolves the requested roots into a [`TaskGraph`], checks which
//! Targets already exist, and executes only what is still needed. Ready
//! tasks run on a bounded pool as soon as their dependencies are done; a
//! failure skips its dependents and leaves unrelated branches running.

use super::builder::StageCatalog;
use super::failure::{FailureCollector, FailureMode, FailureRecord, FailureSummary};
use super::resolve::{TaskGraph, TaskId, TaskInstance};
use crate::config::{EngineSettings, ParamContext};
use crate::core::{FailureKind, StageFailure, StageKind, StageResult, TaskStatus};
use crate::errors::VariantflowError;
use crate::events::{EventSink, PipelineEvent, TaskRef};
use crate::invoke::StageExecutor;
use crate::observability::{task_span, SpanTimer};
use crate::target::{CheckpointStore, FsCheckpointStore, Target};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identity.
    pub run_id: Uuid,
    /// Final status of every resolved task.
    pub statuses: BTreeMap<TaskId, TaskStatus>,
    /// Results of the tasks executed in this run, in completion order.
    pub results: Vec<StageResult>,
    /// Counts and failure records.
    pub summary: FailureSummary,
    /// Wall time of the run in milliseconds.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns true if no task failed or was skipped.
    #[must_use]
    pub fn success(&self) -> bool {
        !self
            .statuses
            .values()
            .any(|s| matches!(s, TaskStatus::Failed | TaskStatus::Skipped))
    }

    /// Number of tasks whose action was executed.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.results.len()
    }

    /// Results of failed tasks.
    #[must_use]
    pub fn failed(&self) -> Vec<&StageResult> {
        self.results.iter().filter(|r| r.status == TaskStatus::Failed).collect()
    }

    /// Tasks skipped because of an upstream failure.
    #[must_use]
    pub fn skipped(&self) -> Vec<&TaskId> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s == TaskStatus::Skipped)
            .map(|(id, _)| id)
            .collect()
    }

    /// Statuses of every task of the named stage.
    #[must_use]
    pub fn statuses_of(&self, stage: &str) -> Vec<TaskStatus> {
        self.statuses
            .iter()
            .filter(|(id, _)| id.stage() == stage)
            .map(|(_, s)| *s)
            .collect()
    }

    /// How many times the named stage was executed.
    #[must_use]
    pub fn executions_of(&self, stage: &str) -> usize {
        self.results.iter().filter(|r| r.stage == stage).count()
    }
}

/// One resolved task and whether its Targets already exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    /// Task identity.
    pub id: TaskId,
    /// Stage name.
    pub stage: String,
    /// Stage kind.
    pub kind: StageKind,
    /// Declared Target.
    pub target: Option<Target>,
    /// Already complete.
    pub complete: bool,
    /// Will execute in a run, because no complete dependent makes it unnecessary.
    pub needed: bool,
}

/// Runs resolved task graphs.
pub struct Scheduler {
    catalog: Arc<StageCatalog>,
    executor: Arc<dyn StageExecutor>,
    store: Arc<dyn CheckpointStore>,
    events: Option<Arc<dyn EventSink>>,
    max_workers: usize,
    failure_mode: FailureMode,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("catalog", &self.catalog.name())
            .field("max_workers", &self.max_workers)
            .field("failure_mode", &self.failure_mode)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler using the filesystem as checkpoint store.
    #[must_use]
    pub fn new(catalog: Arc<StageCatalog>, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            catalog,
            executor,
            store: Arc::new(FsCheckpointStore::new()),
            events: None,
            max_workers: 4,
            failure_mode: FailureMode::default(),
        }
    }

    /// Applies the worker pool size from settings.
    #[must_use]
    pub fn with_settings(self, settings: &EngineSettings) -> Self {
        self.with_max_workers(settings.max_workers)
    }

    /// Sets the checkpoint store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = store;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the worker pool size. Zero is treated as one.
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// The stage table.
    #[must_use]
    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    /// Resolves `roots` and reports completion without executing anything.
    pub async fn plan(
        &self,
        roots: &[&str],
        params: Arc<ParamContext>,
    ) -> Result<Vec<PlannedTask>, VariantflowError> {
        let graph = TaskGraph::resolve(&self.catalog, roots, params)?;
        let complete = self.completed(&graph).await;
        let needed = needed(&graph, &complete);
        Ok(graph
            .iter()
            .map(|task| PlannedTask {
                id: task.id.clone(),
                stage: task.name().to_string(),
                kind: task.stage.kind,
                target: task.target.clone(),
                complete: complete.contains(&task.id),
                needed: needed.contains(&task.id),
            })
            .collect())
    }

    /// Tasks whose Targets exist, checked from the leaves up. A wrapper is
    /// complete when all of its dependencies are.
    async fn completed(&self, graph: &TaskGraph) -> HashSet<TaskId> {
        let mut complete = HashSet::new();
        for task in graph.iter() {
            let done = match task.target {
                Some(ref target) => target.is_complete(self.store.as_ref()).await,
                None => task.deps.iter().all(|(_, dep)| complete.contains(dep)),
            };
            if done {
                complete.insert(task.id.clone());
            }
        }
        complete
    }

    /// Resolves `roots` and executes every incomplete task they need.
    ///
    /// # Errors
    ///
    /// Returns an error only if resolution fails or a worker panics; stage
    /// failures are reported in the [`RunReport`].
    pub async fn run(
        &self,
        roots: &[&str],
        params: Arc<ParamContext>,
    ) -> Result<RunReport, VariantflowError> {
        let timer = SpanTimer::start("run");
        let run_id = Uuid::now_v7();
        let graph = TaskGraph::resolve(&self.catalog, roots, params)?;

        tracing::info!(%run_id, roots = ?roots, tasks = graph.len(), workers = self.max_workers, "Starting run");
        self.notify(PipelineEvent::RunStarted {
            run_id,
            roots: roots.iter().map(ToString::to_string).collect(),
            tasks: graph.len(),
        });

        let complete = self.completed(&graph).await;
        let needed = needed(&graph, &complete);

        let mut collector = FailureCollector::new(self.failure_mode);
        let mut statuses: BTreeMap<TaskId, TaskStatus> = BTreeMap::new();
        for task in graph.iter() {
            if complete.contains(&task.id) {
                statuses.insert(task.id.clone(), TaskStatus::Complete);
                collector.record_complete(&task.id);
                self.notify(PipelineEvent::TaskAlreadyComplete(task_ref(task)));
                tracing::debug!(stage = %task.name(), task_id = %task.id, "Already complete");
            } else {
                statuses.insert(task.id.clone(), TaskStatus::Pending);
            }
        }

        let dependents = graph.dependents();
        let mut waiting: HashMap<TaskId, usize> = HashMap::new();
        let mut ready: VecDeque<TaskId> = VecDeque::new();
        for task in graph.iter().filter(|t| needed.contains(&t.id)) {
            let outstanding: HashSet<&TaskId> = task
                .deps
                .iter()
                .map(|(_, dep)| dep)
                .filter(|dep| !complete.contains(*dep))
                .collect();
            if outstanding.is_empty() {
                ready.push_back(task.id.clone());
            } else {
                waiting.insert(task.id.clone(), outstanding.len());
            }
        }

        let mut results = Vec::new();
        let mut active = FuturesUnordered::new();

        loop {
            while active.len() < self.max_workers {
                let Some(id) = ready.pop_front() else { break };
                let Some(task) = graph.get(&id).map(Arc::clone) else { continue };

                if collector.should_stop() {
                    continue;
                }
                if task.is_wrapper() {
                    statuses.insert(id.clone(), TaskStatus::Succeeded);
                    collector.record_success(&id);
                    self.notify(PipelineEvent::TaskSucceeded {
                        task: task_ref(&task),
                        duration_ms: None,
                    });
                    release(&id, &dependents, &mut waiting, &mut ready);
                    continue;
                }

                statuses.insert(id.clone(), TaskStatus::Running);
                self.notify(PipelineEvent::TaskStarted(task_ref(&task)));
                active.push(self.spawn(task));
            }

            let Some(joined) = active.next().await else { break };
            let (task, mut result) =
                joined.map_err(|e| VariantflowError::Internal(format!("Task join error: {e}")))?;

            if result.is_success() {
                result = self.confirm_targets(&task, result).await;
            }

            if result.is_success() {
                tracing::info!(stage = %task.name(), task_id = %task.id, duration_ms = result.duration_ms(), "Task succeeded");
                statuses.insert(task.id.clone(), TaskStatus::Succeeded);
                collector.record_success(&task.id);
                self.notify(PipelineEvent::TaskSucceeded {
                    task: task_ref(&task),
                    duration_ms: Some(result.duration_ms()),
                });
                release(&task.id, &dependents, &mut waiting, &mut ready);
            } else {
                statuses.insert(task.id.clone(), TaskStatus::Failed);
                if let Some(ref failure) = result.failure {
                    collector.record_failure(FailureRecord::new(task.id.clone(), task.name(), failure));
                }
                self.notify(PipelineEvent::TaskFailed {
                    task: task_ref(&task),
                    failure: result.failure.clone(),
                    quarantined: result.quarantined.clone(),
                });

                for id in graph.downstream_of(&task.id) {
                    if statuses.get(&id) == Some(&TaskStatus::Pending) && needed.contains(&id) {
                        self.skip(&graph, &id, &task.id, &mut statuses, &mut collector);
                    }
                }
            }
            results.push(result);
        }

        // Only reachable with fail-fast: needed tasks that never started.
        let unstarted: Vec<TaskId> = statuses
            .iter()
            .filter(|(id, s)| **s == TaskStatus::Pending && needed.contains(*id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in unstarted {
            statuses.insert(id.clone(), TaskStatus::Skipped);
            collector.record_skip(&id);
            if let Some(task) = graph.get(&id) {
                self.notify(PipelineEvent::TaskSkipped {
                    task: task_ref(task),
                    upstream: None,
                });
            }
        }

        let report = RunReport {
            run_id,
            summary: collector.summary(graph.len()),
            statuses,
            results,
            duration_ms: timer.finish(),
        };

        tracing::info!(
            %run_id,
            success = report.success(),
            executed = report.executed(),
            failed = report.summary.failed,
            skipped = report.summary.skipped,
            duration_ms = report.duration_ms,
            "Run finished"
        );
        self.notify(PipelineEvent::RunCompleted {
            run_id,
            success: report.success(),
            executed: report.executed(),
            failed: report.summary.failed,
            skipped: report.summary.skipped,
        });
        Ok(report)
    }

    fn spawn(&self, task: Arc<TaskInstance>) -> tokio::task::JoinHandle<(Arc<TaskInstance>, StageResult)> {
        let executor = Arc::clone(&self.executor);
        let span = task_span(task.name(), task.id.as_str());
        tokio::spawn(
            async move {
                tracing::info!("Running task");
                let result = executor.execute(&task).await;
                (task, result)
            }
            .instrument(span),
        )
    }

    /// Marks every Target path complete and re-checks it.
    async fn confirm_targets(&self, task: &TaskInstance, result: StageResult) -> StageResult {
        let Some(ref target) = task.target else {
            return result;
        };
        target.mark_complete(self.store.as_ref()).await;
        let missing = target.missing(self.store.as_ref()).await;
        match missing.first() {
            None => result,
            Some(path) => {
                tracing::error!(stage = %task.name(), path = %path.display(), "**** Failure creating {} ****", task.name());
                result.fail(
                    StageFailure::new(
                        FailureKind::EmptyOutput,
                        format!("{} of {} output(s) not complete after execution", missing.len(), target.paths().len()),
                    )
                    .with_path(path),
                )
            }
        }
    }

    fn skip(
        &self,
        graph: &TaskGraph,
        id: &TaskId,
        cause: &TaskId,
        statuses: &mut BTreeMap<TaskId, TaskStatus>,
        collector: &mut FailureCollector,
    ) {
        statuses.insert(id.clone(), TaskStatus::Skipped);
        collector.record_skip(id);
        let Some(task) = graph.get(id) else { return };
        tracing::warn!(stage = %task.name(), task_id = %id, upstream = %cause, "Skipping task after upstream failure");
        self.notify(PipelineEvent::TaskSkipped {
            task: task_ref(task),
            upstream: Some(cause.to_string()),
        });
    }

    fn notify(&self, event: PipelineEvent) {
        if let Some(ref sink) = self.events {
            sink.emit(&event);
        }
    }
}

/// Incomplete tasks reachable from the roots without passing through a
/// complete task.
fn needed(graph: &TaskGraph, complete: &HashSet<TaskId>) -> HashSet<TaskId> {
    let mut needed = HashSet::new();
    let mut stack: Vec<&TaskId> = graph.roots().iter().collect();
    while let Some(id) = stack.pop() {
        if complete.contains(id) || !needed.insert(id.clone()) {
            continue;
        }
        if let Some(task) = graph.get(id) {
            stack.extend(task.deps.iter().map(|(_, dep)| dep));
        }
    }
    needed
}

fn release(
    done: &TaskId,
    dependents: &HashMap<TaskId, Vec<TaskId>>,
    waiting: &mut HashMap<TaskId, usize>,
    ready: &mut VecDeque<TaskId>,
) {
    for child in dependents.get(done).into_iter().flatten() {
        if let Some(count) = waiting.get_mut(child) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                waiting.remove(child);
                ready.push_back(child.clone());
            }
        }
    }
}

fn task_ref(task: &TaskInstance) -> TaskRef {
    TaskRef {
        task_id: task.id.to_string(),
        stage: task.name().to_string(),
        kind: task.stage.kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingEventSink, RUN_COMPLETED, TASK_SKIPPED, TASK_STARTED};
    use crate::pipeline::descriptor::{CommandTemplate, StageDescriptor};
    use crate::pipeline::GraphBuilder;
    use crate::target::InMemoryCheckpointStore;
    use crate::testing::RecordingExecutor;
    use pretty_assertions::assert_eq;

    fn stage(name: &str) -> StageDescriptor {
        StageDescriptor::run(name, vec![CommandTemplate::new("true")]).with_output(format!("/w/{name}"))
    }

    fn chain() -> Arc<StageCatalog> {
        Arc::new(
            GraphBuilder::new("chain")
                .stage(stage("a"))
                .unwrap()
                .stage(stage("b").requires("a"))
                .unwrap()
                .stage(stage("c").requires("b"))
                .unwrap()
                .stage(stage("d"))
                .unwrap()
                .stage(StageDescriptor::wrapper("all").requires("c").requires("d"))
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_runs_in_dependency_order() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let executor = Arc::new(RecordingExecutor::new());
        let events = Arc::new(CollectingEventSink::new());
        let scheduler = Scheduler::new(chain(), executor.clone())
            .with_store(store.clone())
            .with_event_sink(events.clone());

        let report = scheduler.run(&["all"], Arc::new(ParamContext::new())).await.unwrap();

        assert!(report.success());
        assert_eq!(report.executed(), 4);
        let order = executor.executed();
        let pos = |s: &str| order.iter().position(|n| n == s).unwrap();
        assert!(pos("a") < pos("b") && pos("b") < pos("c"));
        assert_eq!(report.statuses_of("all"), vec![TaskStatus::Succeeded]);
        assert_eq!(events.count(TASK_STARTED), 4);
        assert_eq!(events.count(RUN_COMPLETED), 1);
    }

    #[tokio::test]
    async fn test_complete_tasks_not_executed() {
        let store = Arc::new(InMemoryCheckpointStore::with_complete(["/w/a", "/w/d"]));
        let executor = Arc::new(RecordingExecutor::new());
        let scheduler = Scheduler::new(chain(), executor.clone()).with_store(store);

        let report = scheduler.run(&["all"], Arc::new(ParamContext::new())).await.unwrap();
        assert_eq!(executor.executed(), vec!["b", "c"]);
        assert_eq!(report.statuses_of("a"), vec![TaskStatus::Complete]);
        assert_eq!(report.summary.already_complete, 2);
    }

    #[tokio::test]
    async fn test_complete_dependent_makes_upstream_unneeded() {
        let store = Arc::new(InMemoryCheckpointStore::with_complete(["/w/b"]));
        let executor = Arc::new(RecordingExecutor::new());
        let scheduler = Scheduler::new(chain(), executor.clone()).with_store(store);

        let report = scheduler.run(&["c"], Arc::new(ParamContext::new())).await.unwrap();
        assert_eq!(executor.executed(), vec!["c"]);
        assert_eq!(report.statuses_of("a"), vec![TaskStatus::Pending]);
        assert!(report.success());
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let executor = Arc::new(RecordingExecutor::new().failing("b", FailureKind::ExternalTool));
        let events = Arc::new(CollectingEventSink::new());
        let scheduler = Scheduler::new(chain(), executor.clone())
            .with_store(store)
            .with_event_sink(events.clone());

        let report = scheduler.run(&["all"], Arc::new(ParamContext::new())).await.unwrap();

        assert!(!report.success());
        assert_eq!(report.statuses_of("b"), vec![TaskStatus::Failed]);
        assert_eq!(report.statuses_of("c"), vec![TaskStatus::Skipped]);
        assert_eq!(report.statuses_of("all"), vec![TaskStatus::Skipped]);
        assert_eq!(report.statuses_of("d"), vec![TaskStatus::Succeeded]);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.skipped().len(), 2);
        assert_eq!(events.count(TASK_SKIPPED), 2);
        let upstream: Vec<_> = events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::TaskSkipped { upstream, .. } => upstream,
                _ => None,
            })
            .collect();
        assert!(upstream.iter().all(|u| u.starts_with("b-")));
        assert!(!executor.executed().contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn test_fail_fast_starts_nothing_new() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let executor = Arc::new(RecordingExecutor::new().failing("a", FailureKind::Download));
        let scheduler = Scheduler::new(chain(), executor.clone())
            .with_store(store)
            .with_max_workers(1)
            .with_failure_mode(FailureMode::FailFast);

        let report = scheduler.run(&["all"], Arc::new(ParamContext::new())).await.unwrap();
        assert_eq!(report.executed(), 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 4);
    }

    #[tokio::test]
    async fn test_unconfirmed_target_fails() {
        let executor = Arc::new(RecordingExecutor::new());
        let scheduler = Scheduler::new(chain(), executor).with_store(Arc::new(FsCheckpointStore::new()));

        let report = scheduler.run(&["d"], Arc::new(ParamContext::new())).await.unwrap();
        assert_eq!(report.failed()[0].failure_kind(), Some(FailureKind::EmptyOutput));
    }

    #[tokio::test]
    async fn test_plan_reports_completion() {
        let store = Arc::new(InMemoryCheckpointStore::with_complete(["/w/a"]));
        let scheduler = Scheduler::new(chain(), Arc::new(RecordingExecutor::new())).with_store(store);

        let plan = scheduler.plan(&["c"], Arc::new(ParamContext::new())).await.unwrap();
        let states: Vec<_> = plan.iter().map(|t| (t.stage.as_str(), t.complete, t.needed)).collect();
        assert_eq!(states, vec![("a", true, false), ("b", false, true), ("c", false, true)]);
    }

    #[tokio::test]
    async fn test_unknown_root_is_error() {
        let scheduler = Scheduler::new(chain(), Arc::new(RecordingExecutor::new()));
        assert!(scheduler.run(&["nope"], Arc::new(ParamContext::new())).await.is_err());
    }
}
