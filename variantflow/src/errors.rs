//! Error types for the variantflow engine.
//!
//! Engine-level problems (a malformed stage table, an unset template
//! parameter, an I/O error outside a stage) are `Err` values of
//! [`VariantflowError`]. Domain failures of a single stage are never errors
//! here: they are [`crate::core::StageResult`] values tagged with a
//! [`crate::core::FailureKind`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for variantflow operations.
#[derive(Debug, Error)]
pub enum VariantflowError {
    /// The stage table is malformed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A command or path template could not be rendered.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// A requested root stage does not exist.
    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    /// Two different tasks resolved to the same Target path.
    #[error("Tasks '{first}' and '{second}' both claim {}", path.display())]
    TargetCollision {
        /// The contested path.
        path: PathBuf,
        /// Task that claimed it first.
        first: String,
        /// Task that claimed it second.
        second: String,
    },

    /// Layered configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for VariantflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<figment::Error> for VariantflowError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Metadata about a graph contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-002-UNDECLARED_DEP").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stage declaration is rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// A stage name was declared twice.
    #[must_use]
    pub fn duplicate_stage(stage: &str) -> Self {
        Self::new(format!("Stage '{stage}' is already declared"))
            .with_stages(vec![stage.to_string()])
            .with_error_info(
                ContractErrorInfo::new("GRAPH-001-DUPLICATE", "Duplicate stage name")
                    .with_fix_hint("Give every stage descriptor a unique name."),
            )
    }

    /// A stage requires a stage that has not been declared before it.
    #[must_use]
    pub fn undeclared_dependency(stage: &str, dependency: &str) -> Self {
        Self::new(format!(
            "Stage '{stage}' requires '{dependency}', which is not declared yet"
        ))
        .with_stages(vec![stage.to_string(), dependency.to_string()])
        .with_error_info(
            ContractErrorInfo::new("GRAPH-002-UNDECLARED_DEP", "Dependency declared out of order")
                .with_fix_hint("Declare upstream stages before the stages that require them.")
                .with_context_entry("stage", stage)
                .with_context_entry("dependency", dependency),
        )
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised while rendering a `{placeholder}` template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The placeholder names nothing known.
    #[error("Unknown placeholder '{{{placeholder}}}' in '{template}'")]
    Unknown {
        /// Placeholder name without braces.
        placeholder: String,
        /// The template being rendered.
        template: String,
    },

    /// The placeholder names an optional parameter that is not set.
    #[error("Parameter '{0}' is required by this stage but not set")]
    Unset(String),

    /// The placeholder refers to an input or output in a way that is ambiguous.
    #[error("Placeholder '{{{placeholder}}}' is ambiguous: {reason}")]
    Ambiguous {
        /// Placeholder name without braces.
        placeholder: String,
        /// Why it could not be resolved.
        reason: String,
    },
}

/// Error raised by a single download attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection or protocol failure.
    #[error("Transport error fetching {url}: {message}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("Fetching {url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Only http and https are fetched in-process.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Writing the payload failed.
    #[error("Could not write {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Error raised when an external program cannot be run at all.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The program could not be started.
    #[error("Could not start '{program}': {source}")]
    Spawn {
        /// Program name or path.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The stdout redirect file could not be opened.
    #[error("Could not open {path} for output: {source}")]
    Redirect {
        /// Redirect path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
