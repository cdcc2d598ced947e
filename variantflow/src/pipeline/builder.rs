//! Stage table builder with validation.
//!
//! A stage may only require stages declared before it, so the finished
//! table is acyclic without any cycle search.

use super::descriptor::{OutputSpec, StageAction, StageDescriptor};
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for a validated [`StageCatalog`].
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    name: String,
    stages: HashMap<String, Arc<StageDescriptor>>,
    stage_order: Vec<String>,
}

impl GraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: HashMap::new(),
            stage_order: Vec::new(),
        }
    }

    /// Declares a stage, consuming and returning the builder.
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration is rejected (see [`Self::declare`]).
    pub fn stage(mut self, descriptor: StageDescriptor) -> Result<Self, PipelineValidationError> {
        self.declare(descriptor)?;
        Ok(self)
    }

    /// Declares a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken, a required stage is not yet
    /// declared, two edges share a key, or the outputs do not fit the action.
    pub fn declare(&mut self, descriptor: StageDescriptor) -> Result<(), PipelineValidationError> {
        let name = descriptor.name.clone();
        if name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty")
                .with_error_info(ContractErrorInfo::new("GRAPH-000-EMPTY_NAME", "Empty stage name")));
        }
        if self.stages.contains_key(&name) {
            return Err(PipelineValidationError::duplicate_stage(&name));
        }

        let mut keys = HashSet::new();
        for dep in &descriptor.requires {
            if !self.stages.contains_key(&dep.stage) {
                return Err(PipelineValidationError::undeclared_dependency(&name, &dep.stage));
            }
            if !keys.insert(dep.key.as_str()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{name}' uses input key '{}' twice",
                    dep.key
                ))
                .with_stages(vec![name.clone()])
                .with_error_info(
                    ContractErrorInfo::new("GRAPH-003-DUPLICATE_KEY", "Input keys must be unique")
                        .with_fix_hint("Use Dependency::named to give each edge its own key."),
                ));
            }
        }

        let is_wrapper = matches!(descriptor.action, StageAction::Wrapper);
        if is_wrapper != descriptor.outputs.is_none() {
            let summary = if is_wrapper {
                "Wrapper stages cannot declare outputs"
            } else {
                "Only wrapper stages may omit outputs"
            };
            return Err(PipelineValidationError::new(format!("Stage '{name}': {summary}"))
                .with_stages(vec![name.clone()])
                .with_error_info(ContractErrorInfo::new("GRAPH-004-OUTPUTS", summary)));
        }
        if let OutputSpec::Named(ref entries) = descriptor.outputs {
            let mut seen = HashSet::new();
            if let Some((dup, _)) = entries.iter().find(|(k, _)| !seen.insert(k.as_str())) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{name}' declares output '{dup}' twice"
                ))
                .with_stages(vec![name.clone()])
                .with_error_info(ContractErrorInfo::new("GRAPH-004-OUTPUTS", "Duplicate output name")));
            }
        }

        tracing::trace!(stage = %name, deps = descriptor.requires.len(), "Declared stage");
        self.stage_order.push(name.clone());
        self.stages.insert(name, Arc::new(descriptor));
        Ok(())
    }

    /// Returns true if a stage of this name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Builds the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if no stage was declared.
    pub fn build(self) -> Result<StageCatalog, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                ContractErrorInfo::new("GRAPH-000-EMPTY", "Cannot build an empty stage table")
                    .with_fix_hint("Declare at least one stage before building."),
            ));
        }

        Ok(StageCatalog {
            name: self.name,
            stages: self.stages,
            stage_order: self.stage_order,
        })
    }
}

/// An immutable, validated stage table.
#[derive(Debug, Clone)]
pub struct StageCatalog {
    name: String,
    stages: HashMap<String, Arc<StageDescriptor>>,
    stage_order: Vec<String>,
}

impl StageCatalog {
    /// Returns the catalog name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a stage.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<StageDescriptor>> {
        self.stages.get(name)
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the catalog has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<StageDescriptor>> {
        self.stage_order.iter().filter_map(|n| self.stages.get(n))
    }

    /// Names of stages that directly require `name`.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.iter()
            .filter(|s| s.dependency_names().any(|d| d == name))
            .map(|s| s.name.as_str())
            .collect()
    }
}
