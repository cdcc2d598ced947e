//! Stages as data.
//!
//! Every stage of the pipeline is a [`StageDescriptor`] row: its name, what it
//! requires, what it does and what it promises to produce. One generic
//! executor interprets all of them.

use crate::config::ParamOverrides;
use crate::core::StageKind;
use serde::{Deserialize, Serialize};

/// A `requires` edge to an earlier stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name under which the upstream Target is visible as `{input.KEY}`.
    pub key: String,
    /// Upstream stage name.
    pub stage: String,
    /// Parameter overrides applied to the upstream task.
    #[serde(default, skip_serializing_if = "ParamOverrides::is_empty")]
    pub overrides: ParamOverrides,
}

impl Dependency {
    /// Depends on `stage`, visible under its own name.
    #[must_use]
    pub fn on(stage: impl Into<String>) -> Self {
        let stage = stage.into();
        Self {
            key: stage.clone(),
            stage,
            overrides: ParamOverrides::default(),
        }
    }

    /// Depends on `stage`, visible as `{input.KEY}`.
    #[must_use]
    pub fn named(key: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            stage: stage.into(),
            overrides: ParamOverrides::default(),
        }
    }

    /// Sets the overrides applied to the upstream task.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ParamOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// A path template, optionally replaceable by a named parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTemplate {
    /// The default path template.
    pub template: String,
    /// Extra parameter that, when set, replaces the whole path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_param: Option<String>,
}

impl PathTemplate {
    /// Creates a plain path template.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            override_param: None,
        }
    }

    /// Lets the named extra value replace this path, e.g. for manually staged inputs.
    #[must_use]
    pub fn overridable_by(mut self, param: impl Into<String>) -> Self {
        self.override_param = Some(param.into());
        self
    }
}

/// What a stage promises to produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSpec {
    /// No Target; only wrapper stages.
    #[default]
    None,
    /// One artifact.
    Single(PathTemplate),
    /// Several artifacts addressed by name.
    Named(Vec<(String, PathTemplate)>),
}

impl OutputSpec {
    /// One artifact at `template`.
    #[must_use]
    pub fn single(template: impl Into<String>) -> Self {
        Self::Single(PathTemplate::new(template))
    }

    /// Named artifacts from `(name, template)` pairs.
    #[must_use]
    pub fn named<I, K, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<String>,
    {
        Self::Named(
            entries
                .into_iter()
                .map(|(k, t)| (k.into(), PathTemplate::new(t)))
                .collect(),
        )
    }

    /// Returns true if no Target is declared.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One external program call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    /// Program to run.
    pub program: String,
    /// Argument templates.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// When set, standard output is written to this path instead of captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
}

impl CommandTemplate {
    /// Creates a command running `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdout: None,
        }
    }

    /// Shorthand for `python <script>`.
    #[must_use]
    pub fn python(script: impl Into<String>) -> Self {
        Self::new("python").arg(script)
    }

    /// Appends one argument template.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several argument templates.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory template.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Redirects standard output into a file.
    #[must_use]
    pub fn stdout_to(mut self, path: impl Into<String>) -> Self {
        self.stdout = Some(path.into());
        self
    }
}

/// One network fetch of a download stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
    /// URL template.
    pub url: String,
    /// Named output receiving the payload; `None` for a single-output stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Send the run's username and password.
    #[serde(default)]
    pub authenticated: bool,
}

impl FetchSpec {
    /// Fetches `url` into the stage's single output.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output: None,
            authenticated: false,
        }
    }

    /// Fetches `url` into the named output.
    #[must_use]
    pub fn into_output(mut self, name: impl Into<String>) -> Self {
        self.output = Some(name.into());
        self
    }

    /// Uses basic authentication.
    #[must_use]
    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }
}

/// Diff against the previous release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSpec {
    /// Member of the previous archive holding the prior table, relative to the archive root directory.
    pub previous_member: String,
    /// Diff generator; may use `{previous_data}` and `{previous_release_date}`.
    pub command: CommandTemplate,
}

/// The execution procedure of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    /// Nothing to run; the stage only fans out.
    Wrapper,
    /// Network fetches, retried per the download policy.
    Download(Vec<FetchSpec>),
    /// External programs run in order.
    Run(Vec<CommandTemplate>),
    /// Copies one file.
    Copy {
        /// Source path template.
        from: String,
        /// Destination path template.
        to: String,
    },
    /// Unpacks a `.tar.gz` into a directory.
    ExtractArchive {
        /// Archive path template.
        archive: String,
        /// Destination directory template.
        into: String,
    },
    /// Extracts from the previous release and runs the diff generator.
    ReleaseDiff(DiffSpec),
    /// Writes `{date, notes}` version metadata to the single output.
    VersionMetadata,
    /// Writes an md5 checksum table of a tree to the single output.
    Checksums {
        /// Root directory template.
        root: String,
    },
    /// Archives a tree into the single `.tar.gz` output.
    ReleaseArchive {
        /// Root directory template.
        root: String,
    },
}

/// Record-count check applied after the stage ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSpec {
    /// Input table template.
    pub input: String,
    /// Output table template.
    pub output: String,
    /// Log whose marker line carries the removed count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_count_log: Option<String>,
}

impl ValidationSpec {
    /// Checks that `output` has as many rows as `input`.
    #[must_use]
    pub fn preserves(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            removed_count_log: None,
        }
    }

    /// Reads the removed count from a log file.
    #[must_use]
    pub fn with_removed_count_log(mut self, log: impl Into<String>) -> Self {
        self.removed_count_log = Some(log.into());
        self
    }
}

/// One row of the stage table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Unique stage name.
    pub name: String,
    /// Kind of work.
    pub kind: StageKind,
    /// Human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Upstream edges, in order.
    #[serde(default)]
    pub requires: Vec<Dependency>,
    /// Execution procedure.
    pub action: StageAction,
    /// Declared Targets.
    #[serde(default)]
    pub outputs: OutputSpec,
    /// Record-count gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSpec>,
}

impl StageDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind, action: StageAction) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            requires: Vec::new(),
            action,
            outputs: OutputSpec::None,
            validation: None,
        }
    }

    /// A download stage.
    #[must_use]
    pub fn download(name: impl Into<String>, fetches: Vec<FetchSpec>) -> Self {
        Self::new(name, StageKind::Download, StageAction::Download(fetches))
    }

    /// A transform stage running external programs.
    #[must_use]
    pub fn run(name: impl Into<String>, commands: Vec<CommandTemplate>) -> Self {
        Self::new(name, StageKind::Transform, StageAction::Run(commands))
    }

    /// Copies the sole input into `to`, which is also the Target.
    #[must_use]
    pub fn copy(name: impl Into<String>, to: impl Into<String>) -> Self {
        let to = to.into();
        Self::new(
            name,
            StageKind::Copy,
            StageAction::Copy {
                from: "{input}".to_string(),
                to: to.clone(),
            },
        )
        .with_output(to)
    }

    /// A wrapper with no Target of its own.
    #[must_use]
    pub fn wrapper(name: impl Into<String>) -> Self {
        Self::new(name, StageKind::Wrapper, StageAction::Wrapper)
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Requires `stage`, visible under its own name.
    #[must_use]
    pub fn requires(mut self, stage: impl Into<String>) -> Self {
        self.requires.push(Dependency::on(stage));
        self
    }

    /// Adds a dependency edge.
    #[must_use]
    pub fn requires_dep(mut self, dependency: Dependency) -> Self {
        self.requires.push(dependency);
        self
    }

    /// Declares a single output.
    #[must_use]
    pub fn with_output(mut self, template: impl Into<String>) -> Self {
        self.outputs = OutputSpec::single(template);
        self
    }

    /// Declares the outputs.
    #[must_use]
    pub fn with_outputs(mut self, outputs: OutputSpec) -> Self {
        self.outputs = outputs;
        self
    }

    /// Adds a record-count gate.
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationSpec) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Names of the stages this one requires.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.requires.iter().map(|d| d.stage.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_copy_descriptor_targets_destination() {
        let stage = StageDescriptor::copy("clinvar_copy", "{output_dir}/ClinVar.vcf")
            .requires("clinvar_to_vcf");

        assert_eq!(stage.kind, StageKind::Copy);
        assert_eq!(stage.outputs, OutputSpec::single("{output_dir}/ClinVar.vcf"));
        assert_eq!(stage.dependency_names().collect::<Vec<_>>(), vec!["clinvar_to_vcf"]);
        assert!(matches!(stage.action, StageAction::Copy { ref from, .. } if from == "{input}"));
    }

    #[test]
    fn test_command_builder() {
        let cmd = CommandTemplate::python("vcf_sort.py")
            .args(["-i", "{input}"])
            .cwd("{methods_dir}/utilities")
            .stdout_to("{output}");

        assert_eq!(cmd.program, "python");
        assert_eq!(cmd.args, vec!["vcf_sort.py", "-i", "{input}"]);
        assert_eq!(cmd.stdout.as_deref(), Some("{output}"));
    }

    #[test]
    fn test_named_dependency_with_overrides() {
        let dep = Dependency::named("lovd", "shared_lovd_download")
            .with_overrides(ParamOverrides::new().with_extra("lovd_data_file", "/staged.txt"));
        assert_eq!(dep.key, "lovd");
        assert!(!dep.overrides.is_empty());
    }

    #[test]
    fn test_descriptor_serde() {
        let stage = StageDescriptor::download(
            "bic_download",
            vec![FetchSpec::new("https://example.org/brca1").into_output("brca1").authenticated()],
        )
        .with_outputs(OutputSpec::named([("brca1", "{file_parent_dir}/BIC/brca1_data.txt")]));

        let json = serde_json::to_string(&stage).unwrap();
        let back: StageDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stage);
    }
}
