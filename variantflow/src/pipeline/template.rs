//! `{placeholder}` rendering for command arguments and output paths.
//!
//! Placeholders resolve, in order, against stage-local values, the
//! task's inputs and outputs, and finally the [`ParamContext`]:
//!
//! - `{input}`: the sole dependency's single path
//! - `{input.KEY}`: dependency `KEY`, or named target `KEY` of the sole dependency
//! - `{input.DEP.NAME}`: named target `NAME` of dependency `DEP`
//! - `{output}` / `{output.NAME}`: the task's own Target
//! - anything else: a parameter such as `{artifacts_dir}` or an extra value

use crate::config::{Lookup, ParamContext};
use crate::errors::TemplateError;
use crate::target::Target;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.]*)\}").ok());

/// Everything a template may refer to while rendering one task.
#[derive(Debug, Clone)]
pub struct TemplateScope<'a> {
    params: &'a ParamContext,
    inputs: &'a BTreeMap<String, Target>,
    output: Option<&'a Target>,
    locals: BTreeMap<String, String>,
}

impl<'a> TemplateScope<'a> {
    /// Creates a scope for one task.
    #[must_use]
    pub fn new(
        params: &'a ParamContext,
        inputs: &'a BTreeMap<String, Target>,
        output: Option<&'a Target>,
    ) -> Self {
        Self {
            params,
            inputs,
            output,
            locals: BTreeMap::new(),
        }
    }

    /// Adds a stage-local value that shadows parameters.
    #[must_use]
    pub fn with_local(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.locals.insert(key.into(), value.into());
        self
    }

    /// Renders every placeholder in `template`.
    pub fn render(&self, template: &str) -> Result<String, TemplateError> {
        let Some(re) = PLACEHOLDER.as_ref() else {
            return Ok(template.to_string());
        };

        let mut rendered = String::with_capacity(template.len());
        let mut last = 0;
        for caps in re.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            rendered.push_str(&template[last..whole.start()]);
            rendered.push_str(&self.resolve(name.as_str(), template)?);
            last = whole.end();
        }
        rendered.push_str(&template[last..]);
        Ok(rendered)
    }

    /// Renders a template into a path.
    pub fn render_path(&self, template: &str) -> Result<PathBuf, TemplateError> {
        self.render(template).map(PathBuf::from)
    }

    /// Renders each template of a list.
    pub fn render_all(&self, templates: &[String]) -> Result<Vec<String>, TemplateError> {
        templates.iter().map(|t| self.render(t)).collect()
    }

    fn resolve(&self, name: &str, template: &str) -> Result<String, TemplateError> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }

        let mut parts = name.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("input"), None, None) => self.sole_input(name).map(display),
            (Some("input"), Some(key), None) => self.input_key(name, key).map(display),
            (Some("input"), Some(dep), Some(key)) => self
                .inputs
                .get(dep)
                .and_then(|t| t.get(key))
                .map(display)
                .ok_or_else(|| unknown(name, template)),
            (Some("output"), None, None) => self
                .output
                .and_then(Target::as_single)
                .map(display)
                .ok_or_else(|| ambiguous(name, "the stage does not declare a single output")),
            (Some("output"), Some(key), None) => self
                .output
                .and_then(|t| t.get(key))
                .map(display)
                .ok_or_else(|| unknown(name, template)),
            _ => match self.params.lookup(name) {
                Lookup::Value(value) => Ok(value),
                Lookup::Unset => Err(TemplateError::Unset(name.to_string())),
                Lookup::Unknown => Err(unknown(name, template)),
            },
        }
    }

    fn sole_input(&self, name: &str) -> Result<&Path, TemplateError> {
        let mut targets = self.inputs.values();
        match (targets.next(), targets.next()) {
            (Some(target), None) => target
                .as_single()
                .ok_or_else(|| ambiguous(name, "the dependency has named outputs")),
            (None, _) => Err(ambiguous(name, "the stage has no dependencies")),
            (Some(_), Some(_)) => Err(ambiguous(name, "the stage has several dependencies")),
        }
    }

    fn input_key(&self, name: &str, key: &str) -> Result<&Path, TemplateError> {
        if let Some(target) = self.inputs.get(key) {
            return target
                .as_single()
                .ok_or_else(|| ambiguous(name, "the dependency has named outputs"));
        }
        let mut targets = self.inputs.values();
        match (targets.next(), targets.next()) {
            (Some(target), None) => target
                .get(key)
                .ok_or_else(|| ambiguous(name, "no dependency or output has this name")),
            _ => Err(ambiguous(name, "no dependency has this name")),
        }
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn unknown(name: &str, template: &str) -> TemplateError {
    TemplateError::Unknown {
        placeholder: name.to_string(),
        template: template.to_string(),
    }
}

fn ambiguous(name: &str, reason: &str) -> TemplateError {
    TemplateError::Ambiguous {
        placeholder: name.to_string(),
        reason: reason.to_string(),
    }
}
