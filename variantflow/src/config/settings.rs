//! Layered engine settings.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment -> explicit overrides (usually the command line).

use super::ParamContext;
use crate::errors::VariantflowError;
use crate::observability::LogFormat;
use crate::pipeline::RetryConfig;
use crate::validation::DEFAULT_REMOVED_COUNT_MARKER;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file read when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "variantflow.toml";

/// Prefix of environment variables, e.g. `VARIANTFLOW_PARAMS__OUTPUT_DIR`.
pub const ENV_PREFIX: &str = "VARIANTFLOW_";

/// Everything a run needs besides the stage table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Parameters shared by every task.
    pub params: ParamContext,
    /// Maximum number of tasks executing at once.
    pub max_workers: usize,
    /// Retry policy for network downloads.
    pub retry: RetryConfig,
    /// Also quarantine the output of a stage that fails record-count validation.
    pub quarantine_on_mismatch: bool,
    /// Log line marker carrying the removed-record count.
    pub removed_count_marker: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            params: ParamContext::default(),
            max_workers: 4,
            retry: RetryConfig::download(),
            quarantine_on_mismatch: false,
            removed_count_marker: DEFAULT_REMOVED_COUNT_MARKER.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl EngineSettings {
    /// Creates default settings around the given parameters.
    #[must_use]
    pub fn new(params: ParamContext) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Sets the worker pool size. Zero is treated as one.
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Sets the download retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables quarantine on validation mismatch.
    #[must_use]
    pub fn with_quarantine_on_mismatch(mut self, enabled: bool) -> Self {
        self.quarantine_on_mismatch = enabled;
        self
    }
}

/// Load settings with layered precedence.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `VARIANTFLOW_`, `__` for nesting)
/// 3. The config file (`variantflow.toml` when no path is given)
/// 4. Built-in defaults
pub fn load_settings(
    config_file: Option<&Path>,
    overrides: Option<&serde_json::Value>,
) -> Result<EngineSettings, VariantflowError> {
    let mut figment = Figment::from(Serialized::defaults(EngineSettings::default()));

    let file = config_file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if file.exists() {
        figment = figment.merge(Toml::file(file));
    } else if config_file.is_some() {
        return Err(VariantflowError::Config(format!(
            "config file {} does not exist",
            file.display()
        )));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let settings: EngineSettings = figment.extract()?;
    tracing::debug!(
        max_workers = settings.max_workers,
        output_dir = %settings.params.output_dir.display(),
        "Loaded engine settings"
    );
    Ok(settings)
}
