//! Graph resolution: from requested root stages to concrete tasks.
//!
//! Resolution is depth-first. For each stage the dependencies are resolved
//! first, each with the parent's [`ParamContext`] plus the edge's overrides,
//! then the task itself is instantiated and its Targets rendered. A task's
//! identity is its stage name plus a fingerprint of its parameters, so the
//! same stage reached twice with the same parameters is one task.

use super::builder::StageCatalog;
use super::descriptor::{OutputSpec, PathTemplate, StageDescriptor};
use super::template::TemplateScope;
use crate::config::ParamContext;
use crate::errors::{TemplateError, VariantflowError};
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Stable identity of a task: stage name plus parameter fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Builds the identity for `stage` bound to `params`.
    #[must_use]
    pub fn new(stage: &str, params: &ParamContext) -> Self {
        Self(format!("{stage}-{}", params.fingerprint()))
    }

    /// The stage name part of the identity.
    #[must_use]
    pub fn stage(&self) -> &str {
        self.0.rsplit_once('-').map_or(self.0.as_str(), |(stage, _)| stage)
    }

    /// Returns the identity as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stage bound to a parameter context.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    /// Task identity.
    pub id: TaskId,
    /// The stage row this task instantiates.
    pub stage: Arc<StageDescriptor>,
    /// Parameters bound to this task.
    pub params: Arc<ParamContext>,
    /// Upstream tasks by input key, in declaration order.
    pub deps: Vec<(String, TaskId)>,
    /// Upstream Targets by input key. Wrapper dependencies are absent.
    pub inputs: BTreeMap<String, Target>,
    /// Declared Target; `None` for wrappers.
    pub target: Option<Target>,
}

impl TaskInstance {
    /// The stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.stage.name
    }

    /// Returns true if this task only fans out.
    #[must_use]
    pub fn is_wrapper(&self) -> bool {
        self.target.is_none()
    }

    /// A template scope over this task's parameters, inputs and outputs.
    #[must_use]
    pub fn scope(&self) -> TemplateScope<'_> {
        TemplateScope::new(&self.params, &self.inputs, self.target.as_ref())
    }
}

/// The resolved task DAG of one run.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: HashMap<TaskId, Arc<TaskInstance>>,
    order: Vec<TaskId>,
    roots: Vec<TaskId>,
    claimed_paths: HashMap<PathBuf, TaskId>,
}

impl TaskGraph {
    /// Resolves `roots` against `catalog`.
    ///
    /// # Errors
    ///
    /// Returns an error if a root is unknown, a Target template cannot be
    /// rendered, or two different tasks claim the same Target path.
    pub fn resolve(
        catalog: &StageCatalog,
        roots: &[&str],
        params: Arc<ParamContext>,
    ) -> Result<Self, VariantflowError> {
        let mut graph = Self::default();
        for root in roots {
            let id = graph.visit(catalog, root, &params)?;
            if !graph.roots.contains(&id) {
                graph.roots.push(id);
            }
        }
        tracing::debug!(roots = ?roots, tasks = graph.len(), "Resolved task graph");
        Ok(graph)
    }

    fn visit(
        &mut self,
        catalog: &StageCatalog,
        stage_name: &str,
        params: &Arc<ParamContext>,
    ) -> Result<TaskId, VariantflowError> {
        let stage = catalog
            .get(stage_name)
            .ok_or_else(|| VariantflowError::UnknownStage(stage_name.to_string()))?;

        let id = TaskId::new(stage_name, params);
        if self.tasks.contains_key(&id) {
            return Ok(id);
        }

        let mut deps = Vec::with_capacity(stage.requires.len());
        let mut inputs = BTreeMap::new();
        for dep in &stage.requires {
            let dep_params = if dep.overrides.is_empty() {
                Arc::clone(params)
            } else {
                Arc::new(params.apply(&dep.overrides))
            };
            let dep_id = self.visit(catalog, &dep.stage, &dep_params)?;
            if let Some(target) = self.tasks.get(&dep_id).and_then(|t| t.target.clone()) {
                inputs.insert(dep.key.clone(), target);
            }
            deps.push((dep.key.clone(), dep_id));
        }

        let target = render_target(&stage.outputs, params).map_err(|e| {
            tracing::error!(stage = %stage_name, error = %e, "Cannot render outputs");
            e
        })?;
        if let Some(ref target) = target {
            for path in target.paths() {
                if let Some(owner) = self.claimed_paths.get(path) {
                    return Err(VariantflowError::TargetCollision {
                        path: path.to_path_buf(),
                        first: owner.to_string(),
                        second: id.to_string(),
                    });
                }
            }
            for path in target.paths() {
                self.claimed_paths.insert(path.to_path_buf(), id.clone());
            }
        }

        let task = TaskInstance {
            id: id.clone(),
            stage: Arc::clone(stage),
            params: Arc::clone(params),
            deps,
            inputs,
            target,
        };
        self.tasks.insert(id.clone(), Arc::new(task));
        self.order.push(id.clone());
        Ok(id)
    }

    /// Looks up a task.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Arc<TaskInstance>> {
        self.tasks.get(id)
    }

    /// Tasks with every dependency before its dependents.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TaskInstance>> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Task ids in dependency order.
    #[must_use]
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    /// The requested roots, de-duplicated.
    #[must_use]
    pub fn roots(&self) -> &[TaskId] {
        &self.roots
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if there are no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Direct dependents of each task.
    #[must_use]
    pub fn dependents(&self) -> HashMap<TaskId, Vec<TaskId>> {
        let mut map: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in self.iter() {
            for (_, dep) in &task.deps {
                let children = map.entry(dep.clone()).or_default();
                if !children.contains(&task.id) {
                    children.push(task.id.clone());
                }
            }
        }
        map
    }

    /// Every task that transitively depends on `id`.
    #[must_use]
    pub fn downstream_of(&self, id: &TaskId) -> Vec<TaskId> {
        let dependents = self.dependents();
        let mut seen = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            for child in dependents.get(&current).into_iter().flatten() {
                if !seen.contains(child) {
                    seen.push(child.clone());
                    stack.push(child.clone());
                }
            }
        }
        seen
    }
}

fn render_path(template: &PathTemplate, scope: &TemplateScope<'_>, params: &ParamContext) -> Result<PathBuf, TemplateError> {
    if let Some(value) = template
        .override_param
        .as_ref()
        .and_then(|p| params.extras.get(p))
    {
        return Ok(PathBuf::from(value));
    }
    scope.render_path(&template.template)
}

fn render_target(outputs: &OutputSpec, params: &ParamContext) -> Result<Option<Target>, TemplateError> {
    let no_inputs = BTreeMap::new();
    let scope = TemplateScope::new(params, &no_inputs, None);
    match outputs {
        OutputSpec::None => Ok(None),
        OutputSpec::Single(template) => {
            Ok(Some(Target::Single(render_path(template, &scope, params)?)))
        }
        OutputSpec::Named(entries) => {
            let mut map = BTreeMap::new();
            for (name, template) in entries {
                map.insert(name.clone(), render_path(template, &scope, params)?);
            }
            Ok(Some(Target::Named(map)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamOverrides;
    use crate::pipeline::builder::GraphBuilder;
    use crate::pipeline::descriptor::{CommandTemplate, Dependency, StageDescriptor};
    use pretty_assertions::assert_eq;

    fn stage(name: &str) -> StageDescriptor {
        StageDescriptor::run(name, vec![CommandTemplate::new("true")])
            .with_output(format!("{{file_parent_dir}}/{name}.out"))
    }

    fn params() -> Arc<ParamContext> {
        Arc::new(ParamContext::new().with_file_parent_dir("/work").with_output_dir("/out"))
    }

    #[test]
    fn test_dependencies_resolved_first() {
        let catalog = GraphBuilder::new("t")
            .stage(stage("a"))
            .unwrap()
            .stage(stage("b").requires("a"))
            .unwrap()
            .stage(stage("c").requires("b"))
            .unwrap()
            .build()
            .unwrap();

        let graph = TaskGraph::resolve(&catalog, &["c"], params()).unwrap();
        assert_eq!(graph.roots()[0].stage(), "c");
        let names: Vec<_> = graph.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let c = graph.get(&graph.roots()[0]).unwrap();
        assert_eq!(c.inputs.get("b"), Some(&Target::single("/work/b.out")));
    }

    #[test]
    fn test_shared_dependency_resolved_once() {
        let catalog = GraphBuilder::new("t")
            .stage(stage("shared"))
            .unwrap()
            .stage(stage("left").requires("shared"))
            .unwrap()
            .stage(stage("right").requires("shared"))
            .unwrap()
            .stage(StageDescriptor::wrapper("all").requires("left").requires("right"))
            .unwrap()
            .build()
            .unwrap();

        let graph = TaskGraph::resolve(&catalog, &["all", "all"], params()).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.roots().len(), 1);

        let all = graph.get(&graph.roots()[0]).unwrap();
        assert!(all.is_wrapper());
        assert!(all.inputs.contains_key("left"));
    }

    #[test]
    fn test_overrides_give_distinct_tasks_and_paths() {
        let catalog = GraphBuilder::new("t")
            .stage(stage("fetch"))
            .unwrap()
            .stage(
                stage("one").requires_dep(
                    Dependency::named("src", "fetch")
                        .with_overrides(ParamOverrides::new().with_file_parent_dir("/work/one")),
                ),
            )
            .unwrap()
            .stage(
                stage("two").requires_dep(
                    Dependency::named("src", "fetch")
                        .with_overrides(ParamOverrides::new().with_file_parent_dir("/work/two")),
                ),
            )
            .unwrap()
            .build()
            .unwrap();

        let graph = TaskGraph::resolve(&catalog, &["one", "two"], params()).unwrap();
        let fetches: Vec<_> = graph.iter().filter(|t| t.name() == "fetch").collect();
        assert_eq!(fetches.len(), 2);
        assert_ne!(fetches[0].id, fetches[1].id);
        assert_ne!(fetches[0].target, fetches[1].target);
    }

    #[test]
    fn test_output_override_param() {
        let catalog = GraphBuilder::new("t")
            .stage(stage("download").with_outputs(OutputSpec::Single(
                PathTemplate::new("{file_parent_dir}/LOVD/BRCA.txt").overridable_by("lovd_data_file"),
            )))
            .unwrap()
            .build()
            .unwrap();

        let graph = TaskGraph::resolve(&catalog, &["download"], params()).unwrap();
        assert_eq!(graph.iter().next().unwrap().target, Some(Target::single("/work/LOVD/BRCA.txt")));

        let staged = Arc::new((*params()).clone().with_extra("lovd_data_file", "/staged/BRCA.txt"));
        let graph = TaskGraph::resolve(&catalog, &["download"], staged).unwrap();
        assert_eq!(graph.iter().next().unwrap().target, Some(Target::single("/staged/BRCA.txt")));
    }

    #[test]
    fn test_unknown_root() {
        let catalog = GraphBuilder::new("t").stage(stage("a")).unwrap().build().unwrap();
        let err = TaskGraph::resolve(&catalog, &["missing"], params()).unwrap_err();
        assert!(matches!(err, VariantflowError::UnknownStage(ref s) if s == "missing"));
    }

    #[test]
    fn test_target_collision_detected() {
        let catalog = GraphBuilder::new("t")
            .stage(stage("a").with_output("/same/path"))
            .unwrap()
            .stage(stage("b").with_output("/same/path"))
            .unwrap()
            .build()
            .unwrap();
        let err = TaskGraph::resolve(&catalog, &["a", "b"], params()).unwrap_err();
        assert!(matches!(err, VariantflowError::TargetCollision { .. }));
    }

    #[test]
    fn test_downstream_of() {
        let catalog = GraphBuilder::new("t")
            .stage(stage("a"))
            .unwrap()
            .stage(stage("b").requires("a"))
            .unwrap()
            .stage(stage("c").requires("b"))
            .unwrap()
            .stage(stage("d"))
            .unwrap()
            .build()
            .unwrap();
        let graph = TaskGraph::resolve(&catalog, &["c", "d"], params()).unwrap();
        let a = graph.order()[0].clone();
        let downstream: Vec<_> = graph
            .downstream_of(&a)
            .iter()
            .map(|id| graph.get(id).unwrap().name().to_string())
            .collect();
        assert_eq!(downstream, vec!["b", "c"]);
    }
}
