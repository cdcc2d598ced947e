//! The generic stage interpreter.
//!
//! [`DescriptorExecutor`] runs any [`TaskInstance`] by interpreting its
//! [`StageAction`], then judges the outcome by looking at the declared
//! outputs: missing or empty outputs fail the stage, empty ones are
//! quarantined, and gated stages must pass the record-count check.

use super::download::{fetch_with_retry, Downloader, FetchRequest, HttpDownloader};
use super::process::{Invocation, ProcessInvoker, SystemProcessInvoker};
use crate::config::EngineSettings;
use crate::core::{FailureKind, StageFailure, StageResult};
use crate::errors::TemplateError;
use crate::pipeline::descriptor::{CommandTemplate, DiffSpec, FetchSpec, StageAction, ValidationSpec};
use crate::pipeline::template::TemplateScope;
use crate::pipeline::{RetryConfig, TaskInstance};
use crate::quarantine::quarantine;
use crate::release::{archive, checksum, metadata};
use crate::target::Target;
use crate::validation::{ValidationError, ValidationGate};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runs one task and reports its outcome.
///
/// Implementations never return `Err`: every failure is a [`StageResult`]
/// tagged with a [`FailureKind`].
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Executes the task's action and checks its outputs.
    async fn execute(&self, task: &TaskInstance) -> StageResult;
}

type Step<T = ()> = Result<T, StageFailure>;

fn configuration(err: &TemplateError) -> StageFailure {
    StageFailure::new(FailureKind::Configuration, err.to_string())
}

fn tool(message: impl Into<String>) -> StageFailure {
    StageFailure::new(FailureKind::ExternalTool, message)
}

/// Interprets stage descriptors.
pub struct DescriptorExecutor {
    invoker: Arc<dyn ProcessInvoker>,
    downloader: Arc<dyn Downloader>,
    retry: RetryConfig,
    gate: ValidationGate,
    quarantine_on_mismatch: bool,
}

impl std::fmt::Debug for DescriptorExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorExecutor")
            .field("retry", &self.retry)
            .field("gate", &self.gate)
            .field("quarantine_on_mismatch", &self.quarantine_on_mismatch)
            .finish_non_exhaustive()
    }
}

impl DescriptorExecutor {
    /// Creates an executor over the given process and download seams.
    #[must_use]
    pub fn new(invoker: Arc<dyn ProcessInvoker>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            invoker,
            downloader,
            retry: RetryConfig::download(),
            gate: ValidationGate::default(),
            quarantine_on_mismatch: false,
        }
    }

    /// Creates an executor running real programs and HTTP downloads.
    #[must_use]
    pub fn system(settings: &EngineSettings) -> Self {
        Self::new(Arc::new(SystemProcessInvoker::new()), Arc::new(HttpDownloader::new()))
            .with_settings(settings)
    }

    /// Applies retry, gate and quarantine settings.
    #[must_use]
    pub fn with_settings(self, settings: &EngineSettings) -> Self {
        self.with_retry(settings.retry.clone())
            .with_removed_count_marker(settings.removed_count_marker.clone())
            .with_quarantine_on_mismatch(settings.quarantine_on_mismatch)
    }

    /// Sets the download retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the log marker carrying removed-record counts.
    #[must_use]
    pub fn with_removed_count_marker(mut self, marker: impl Into<String>) -> Self {
        self.gate = ValidationGate::new(marker);
        self
    }

    /// Also quarantine outputs that fail the record-count check.
    #[must_use]
    pub fn with_quarantine_on_mismatch(mut self, enabled: bool) -> Self {
        self.quarantine_on_mismatch = enabled;
        self
    }

    async fn run(&self, task: &TaskInstance, target: &Target, result: &mut StageResult) -> Step {
        prepare_parents(target).await?;
        if let Err(failure) = self.run_action(task, target, result).await {
            // A redirect target is created before the program starts.
            let _ = check_outputs(target, result).await;
            return Err(match result.quarantined.first() {
                Some(moved) if failure.path.is_none() => failure.with_path(moved),
                _ => failure,
            });
        }
        check_outputs(target, result).await?;
        if let Some(ref spec) = task.stage.validation {
            self.validate(task, spec, result).await?;
        }
        Ok(())
    }

    async fn run_action(&self, task: &TaskInstance, target: &Target, result: &mut StageResult) -> Step {
        let scope = task.scope();
        match task.stage.action {
            StageAction::Wrapper => Ok(()),
            StageAction::Download(ref fetches) => {
                for fetch in fetches {
                    self.download(task, fetch, target, &scope, result).await?;
                }
                Ok(())
            }
            StageAction::Run(ref commands) => {
                for command in commands {
                    self.invoke(command, &scope, result).await?;
                }
                Ok(())
            }
            StageAction::Copy { ref from, ref to } => {
                let from = scope.render_path(from).map_err(|e| configuration(&e))?;
                let to = scope.render_path(to).map_err(|e| configuration(&e))?;
                tokio::fs::copy(&from, &to)
                    .await
                    .map_err(|e| tool(format!("copy {} -> {}: {e}", from.display(), to.display())))?;
                Ok(())
            }
            StageAction::ExtractArchive {
                archive: ref tarball,
                ref into,
            } => {
                let tarball = scope.render_path(tarball).map_err(|e| configuration(&e))?;
                let into = scope.render_path(into).map_err(|e| configuration(&e))?;
                blocking(move || archive::extract_all(&tarball, &into)).await
            }
            StageAction::ReleaseDiff(ref spec) => self.release_diff(task, spec, result).await,
            StageAction::VersionMetadata => {
                let out = single_output(target)?;
                let notes = release_notes(task.params.release_notes.as_deref(), result).await;
                let meta = metadata::VersionMetadata::new(task.params.date, notes);
                blocking(move || metadata::write_version_metadata(&out, &meta)).await
            }
            StageAction::Checksums { ref root } => {
                let root = scope.render_path(root).map_err(|e| configuration(&e))?;
                let out = single_output(target)?;
                blocking(move || checksum::write_md5sums(&root, &out).map(|_| ())).await
            }
            StageAction::ReleaseArchive { ref root } => {
                let root = scope.render_path(root).map_err(|e| configuration(&e))?;
                let out = single_output(target)?;
                blocking(move || archive::create_archive(&root, &out).map(|_| ())).await
            }
        }
    }

    async fn download(
        &self,
        task: &TaskInstance,
        fetch: &FetchSpec,
        target: &Target,
        scope: &TemplateScope<'_>,
        result: &mut StageResult,
    ) -> Step {
        let url = scope.render(&fetch.url).map_err(|e| configuration(&e))?;
        let dest = match fetch.output {
            Some(ref name) => target.get(name),
            None => target.as_single(),
        }
        .ok_or_else(|| {
            StageFailure::new(
                FailureKind::Configuration,
                format!("no output receives the download of {url}"),
            )
        })?;

        let mut request = FetchRequest::new(url, dest);
        if fetch.authenticated {
            let (Some(user), Some(password)) = (&task.params.username, &task.params.password) else {
                return Err(configuration(&TemplateError::Unset("username/password".into())));
            };
            request = request.with_credentials(user.clone(), password.clone());
        }

        let outcome = fetch_with_retry(self.downloader.as_ref(), &request, &self.retry).await;
        result.download_attempts += outcome.attempts;
        match outcome.result {
            Ok(bytes) => {
                tracing::info!(url = %request.url, bytes, attempts = outcome.attempts, "Download finished");
                Ok(())
            }
            Err(e) => Err(StageFailure::new(
                FailureKind::Download,
                format!("{e} (after {} attempts)", outcome.attempts),
            )
            .with_path(&request.dest)),
        }
    }

    async fn invoke(&self, command: &CommandTemplate, scope: &TemplateScope<'_>, result: &mut StageResult) -> Step {
        let invocation = render_invocation(command, scope).map_err(|e| configuration(&e))?;
        let output = self
            .invoker
            .invoke(&invocation)
            .await
            .map_err(|e| tool(e.to_string()))?;

        let record = output.into_record(&invocation);
        if record.exited_abnormally() || !record.stderr.trim().is_empty() {
            let warning = format!(
                "{}: {} exited with {:?}: {}",
                FailureKind::ExternalTool,
                invocation.program,
                record.exit_code,
                record.stderr.trim()
            );
            tracing::warn!(command = %invocation.command_line(), exit_code = ?record.exit_code, "External program reported a problem");
            result.warn(warning);
        }
        result.invocations.push(record);
        Ok(())
    }

    async fn release_diff(&self, task: &TaskInstance, spec: &DiffSpec, result: &mut StageResult) -> Step {
        let previous = task
            .params
            .previous_release_tar
            .clone()
            .ok_or_else(|| configuration(&TemplateError::Unset("previous_release_tar".into())))?;

        let workdir = tempfile::tempdir().map_err(|e| tool(format!("temporary directory: {e}")))?;
        let into = workdir.path().to_path_buf();
        let member = PathBuf::from(&spec.previous_member);
        let (previous_data, previous_date) = blocking_value(move || {
            let data = archive::extract_member(&previous, &member, &into)?;
            let version = archive::extract_member(&previous, Path::new("release/metadata/version.json"), &into)?;
            Ok((data, metadata::read_release_date(&version)?))
        })
        .await?;

        tracing::info!(
            previous_data = %previous_data.display(),
            previous_release_date = %previous_date,
            "Extracted previous release"
        );

        let scope = task
            .scope()
            .with_local("previous_data", previous_data.display().to_string())
            .with_local("previous_release_date", previous_date.format("%m-%d-%Y").to_string());
        self.invoke(&spec.command, &scope, result).await
    }

    async fn validate(&self, task: &TaskInstance, spec: &ValidationSpec, result: &mut StageResult) -> Step {
        let scope = task.scope();
        let input = scope.render_path(&spec.input).map_err(|e| configuration(&e))?;
        let output = scope.render_path(&spec.output).map_err(|e| configuration(&e))?;
        let log = spec
            .removed_count_log
            .as_ref()
            .map(|l| scope.render_path(l))
            .transpose()
            .map_err(|e| configuration(&e))?;

        match self.gate.check(&input, &output, log.as_deref()).await {
            Ok(counts) => {
                tracing::debug!(input = counts.input, output = counts.output, removed = counts.removed, "Record counts hold");
                result.record_counts = Some(counts);
                Ok(())
            }
            Err(ValidationError::Mismatch { counts }) => {
                result.record_counts = Some(counts);
                let mut failure = StageFailure::new(
                    FailureKind::ValidationMismatch,
                    ValidationError::Mismatch { counts }.to_string(),
                )
                .with_path(&output);
                if self.quarantine_on_mismatch {
                    match quarantine(&output).await {
                        Ok(moved) => {
                            failure = failure.with_path(&moved);
                            result.quarantined.push(moved);
                        }
                        Err(e) => tracing::error!(path = %output.display(), error = %e, "Could not quarantine"),
                    }
                }
                Err(failure)
            }
            Err(e) => Err(StageFailure::new(FailureKind::ValidationMismatch, e.to_string())),
        }
    }
}

#[async_trait]
impl StageExecutor for DescriptorExecutor {
    async fn execute(&self, task: &TaskInstance) -> StageResult {
        let mut result = StageResult::started(task.id.as_str(), task.name());
        let Some(ref target) = task.target else {
            return result.succeed();
        };

        match self.run(task, target, &mut result).await {
            Ok(()) => result.succeed(),
            Err(failure) => {
                tracing::error!(
                    stage = %task.name(),
                    task_id = %task.id,
                    kind = %failure.kind,
                    path = ?failure.path,
                    quarantined = ?result.quarantined,
                    "**** Failure creating {} ****: {}",
                    task.name(),
                    failure.message
                );
                result.fail(failure)
            }
        }
    }
}

fn render_invocation(command: &CommandTemplate, scope: &TemplateScope<'_>) -> Result<Invocation, TemplateError> {
    let mut invocation = Invocation::new(scope.render(&command.program)?).with_args(scope.render_all(&command.args)?);
    if let Some(ref cwd) = command.cwd {
        invocation = invocation.with_cwd(scope.render_path(cwd)?);
    }
    if let Some(ref stdout) = command.stdout {
        invocation = invocation.with_stdout_path(scope.render_path(stdout)?);
    }
    Ok(invocation)
}

fn single_output(target: &Target) -> Step<PathBuf> {
    target.as_single().map(Path::to_path_buf).ok_or_else(|| {
        StageFailure::new(FailureKind::Configuration, "this action needs a single output path")
    })
}

async fn prepare_parents(target: &Target) -> Step {
    for path in target.paths() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| tool(format!("create {}: {e}", parent.display())))?;
        }
    }
    Ok(())
}

/// Missing outputs fail the stage; empty ones are also quarantined.
async fn check_outputs(target: &Target, result: &mut StageResult) -> Step {
    let mut missing = Vec::new();
    for path in target.paths() {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() == 0 => match quarantine(path).await {
                Ok(moved) => result.quarantined.push(moved),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Could not quarantine");
                    missing.push(path.to_path_buf());
                }
            },
            Ok(_) => {}
            Err(_) => missing.push(path.to_path_buf()),
        }
    }

    if let Some(first) = result.quarantined.first() {
        return Err(StageFailure::new(
            FailureKind::EmptyOutput,
            format!("{} empty output(s) quarantined", result.quarantined.len()),
        )
        .with_path(first));
    }
    if let Some(first) = missing.first() {
        return Err(StageFailure::new(
            FailureKind::EmptyOutput,
            format!("output {} was not created", first.display()),
        )
        .with_path(first));
    }
    Ok(())
}

async fn release_notes(notes: Option<&str>, result: &mut StageResult) -> String {
    let Some(notes) = notes else {
        result.warn("no release notes given");
        return String::new();
    };
    match tokio::fs::read_to_string(notes).await {
        Ok(text) => text,
        Err(_) => notes.to_string(),
    }
}

async fn blocking<F>(work: F) -> Step
where
    F: FnOnce() -> std::io::Result<()> + Send + 'static,
{
    blocking_value(work).await
}

async fn blocking_value<T, F>(work: F) -> Step<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| tool(e.to_string()))?
        .map_err(|e| tool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamContext;
    use crate::core::TaskStatus;
    use crate::errors::DownloadError;
    use crate::invoke::download::MockDownloader;
    use crate::invoke::process::{MockProcessInvoker, ProcessOutput};
    use crate::pipeline::descriptor::StageDescriptor;
    use crate::pipeline::{GraphBuilder, TaskGraph};
    use crate::quarantine::is_quarantined;
    use std::fmt::Write as _;

    fn resolve(stages: Vec<StageDescriptor>, root: &str, params: ParamContext) -> Arc<TaskInstance> {
        let mut builder = GraphBuilder::new("test");
        for stage in stages {
            builder.declare(stage).unwrap();
        }
        let catalog = builder.build().unwrap();
        let graph = TaskGraph::resolve(&catalog, &[root], Arc::new(params)).unwrap();
        Arc::clone(graph.get(&graph.roots()[0]).unwrap())
    }

    fn params(dir: &Path) -> ParamContext {
        ParamContext::new()
            .with_output_dir(dir.join("output"))
            .with_file_parent_dir(dir.join("work"))
    }

    fn unused_downloader() -> Arc<dyn Downloader> {
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().never();
        Arc::new(downloader)
    }

    fn ok_output() -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(0),
            ..ProcessOutput::default()
        }
    }

    fn table(rows: usize) -> String {
        let mut text = String::from("id\tvalue\n");
        for i in 0..rows {
            writeln!(text, "{i}\tx").unwrap();
        }
        text
    }

    #[tokio::test]
    async fn test_run_renders_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("work/sorted.vcf");
        let task = resolve(
            vec![StageDescriptor::run(
                "sort",
                vec![CommandTemplate::python("vcf_sort.py")
                    .args(["-o", "{output}"])
                    .cwd("{methods_dir}/utilities")],
            )
            .with_output("{file_parent_dir}/sorted.vcf")],
            "sort",
            params(dir.path()).with_methods_dir("/methods"),
        );

        let written = out.clone();
        let mut invoker = MockProcessInvoker::new();
        invoker
            .expect_invoke()
            .withf(|inv| inv.cwd == Some(PathBuf::from("/methods/utilities")) && inv.args[0] == "vcf_sort.py")
            .times(1)
            .returning(move |_| {
                std::fs::write(&written, "##fileformat=VCFv4.1\n").unwrap();
                Ok(ok_output())
            });

        let executor = DescriptorExecutor::new(Arc::new(invoker), unused_downloader());
        let result = executor.execute(&task).await;
        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.invocations.len(), 1);
        assert_eq!(result.invocations[0].args[2], out.display().to_string());
    }

    #[tokio::test]
    async fn test_empty_output_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("work/empty.vcf");
        let task = resolve(
            vec![StageDescriptor::run("convert", vec![CommandTemplate::new("convert")])
                .with_output("{file_parent_dir}/empty.vcf")],
            "convert",
            params(dir.path()),
        );

        let written = out.clone();
        let mut invoker = MockProcessInvoker::new();
        invoker.expect_invoke().returning(move |_| {
            std::fs::write(&written, b"").unwrap();
            Ok(ok_output())
        });

        let executor = DescriptorExecutor::new(Arc::new(invoker), unused_downloader());
        let result = executor.execute(&task).await;

        assert_eq!(result.failure_kind(), Some(FailureKind::EmptyOutput));
        assert!(!out.exists());
        assert_eq!(result.quarantined.len(), 1);
        assert!(is_quarantined(&result.quarantined[0]));
        assert_eq!(std::fs::read(&result.quarantined[0]).unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_missing_output_is_not_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let task = resolve(
            vec![StageDescriptor::run("convert", vec![CommandTemplate::new("convert")])
                .with_output("{file_parent_dir}/never.vcf")],
            "convert",
            params(dir.path()),
        );
        let mut invoker = MockProcessInvoker::new();
        invoker.expect_invoke().returning(|_| {
            Ok(ProcessOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "Traceback".into(),
            })
        });

        let result = DescriptorExecutor::new(Arc::new(invoker), unused_downloader())
            .execute(&task)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::EmptyOutput));
        assert!(result.quarantined.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_external_tool() {
        let dir = tempfile::tempdir().unwrap();
        let task = resolve(
            vec![StageDescriptor::run("convert", vec![CommandTemplate::new("missing-tool")])
                .with_output("{file_parent_dir}/x.vcf")],
            "convert",
            params(dir.path()),
        );
        let mut invoker = MockProcessInvoker::new();
        invoker.expect_invoke().returning(|inv| {
            Err(crate::errors::InvokeError::Spawn {
                program: inv.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });

        let result = DescriptorExecutor::new(Arc::new(invoker), unused_downloader())
            .execute(&task)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ExternalTool));
    }

    #[tokio::test]
    async fn test_spawn_failure_quarantines_redirect_target() {
        let dir = tempfile::tempdir().unwrap();
        let task = resolve(
            vec![StageDescriptor::run(
                "sort",
                vec![CommandTemplate::new("vcf-sort").arg("x").stdout_to("{output}")],
            )
            .with_output("{file_parent_dir}/sorted.vcf")],
            "sort",
            params(dir.path()),
        );
        let sorted = dir.path().join("work").join("sorted.vcf");
        let mut invoker = MockProcessInvoker::new();
        invoker.expect_invoke().returning(|inv| {
            if let Some(ref path) = inv.stdout_path {
                std::fs::File::create(path).unwrap();
            }
            Err(crate::errors::InvokeError::Spawn {
                program: inv.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });

        let result = DescriptorExecutor::new(Arc::new(invoker), unused_downloader())
            .execute(&task)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ExternalTool));
        assert_eq!(result.quarantined.len(), 1);
        assert!(is_quarantined(&result.quarantined[0]));
        assert!(!sorted.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_exhaustion_is_download_failure() {
        let dir = tempfile::tempdir().unwrap();
        let task = resolve(
            vec![StageDescriptor::download("fetch", vec![FetchSpec::new("https://example.org/a.tsv")])
                .with_output("{file_parent_dir}/a.tsv")],
            "fetch",
            params(dir.path()),
        );
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().times(3).returning(|r| {
            Err(DownloadError::Status {
                url: r.url.clone(),
                status: 500,
            })
        });

        let result = DescriptorExecutor::new(Arc::new(MockProcessInvoker::new()), Arc::new(downloader))
            .execute(&task)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Download));
        assert_eq!(result.download_attempts, 3);
    }

    #[tokio::test]
    async fn test_authenticated_download_requires_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let task = resolve(
            vec![StageDescriptor::download(
                "bic",
                vec![FetchSpec::new("https://example.org/brca1").authenticated()],
            )
            .with_output("{file_parent_dir}/brca1.txt")],
            "bic",
            params(dir.path()),
        );

        let result = DescriptorExecutor::new(Arc::new(MockProcessInvoker::new()), unused_downloader())
            .execute(&task)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Configuration));
    }

    #[tokio::test]
    async fn test_validation_gate_with_removed_count() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("in.tsv"), table(100)).unwrap();

        let stage = |rows: usize| {
            let out = work.join("out.tsv");
            let log = work.join("filter.log");
            let mut invoker = MockProcessInvoker::new();
            invoker.expect_invoke().returning(move |_| {
                std::fs::write(&out, table(rows)).unwrap();
                std::fs::write(&log, "ERROR COUNT: 5\n").unwrap();
                Ok(ok_output())
            });
            invoker
        };
        let task = resolve(
            vec![StageDescriptor::run("filter", vec![CommandTemplate::new("filter")])
                .with_output("{file_parent_dir}/out.tsv")
                .with_validation(
                    ValidationSpec::preserves("{file_parent_dir}/in.tsv", "{output}")
                        .with_removed_count_log("{file_parent_dir}/filter.log"),
                )],
            "filter",
            params(dir.path()),
        );

        let result = DescriptorExecutor::new(Arc::new(stage(95)), unused_downloader())
            .execute(&task)
            .await;
        assert!(result.is_success());
        assert_eq!(result.record_counts.unwrap().removed, 5);

        let result = DescriptorExecutor::new(Arc::new(stage(96)), unused_downloader())
            .execute(&task)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ValidationMismatch));
        assert!(result.quarantined.is_empty());
        assert!(work.join("out.tsv").exists());

        let result = DescriptorExecutor::new(Arc::new(stage(94)), unused_downloader())
            .with_quarantine_on_mismatch(true)
            .execute(&task)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ValidationMismatch));
        assert_eq!(result.quarantined.len(), 1);
        assert!(!work.join("out.tsv").exists());
    }

    #[tokio::test]
    async fn test_release_diff_requires_previous_archive() {
        let dir = tempfile::tempdir().unwrap();
        let task = resolve(
            vec![StageDescriptor::new(
                "diff",
                crate::core::StageKind::Release,
                StageAction::ReleaseDiff(DiffSpec {
                    previous_member: "release/built_with_change_types.tsv".into(),
                    command: CommandTemplate::python("releaseDiff.py").args(["--v1", "{previous_data}"]),
                }),
            )
            .with_output("{release_dir}/built_with_change_types.tsv")],
            "diff",
            params(dir.path()),
        );

        let result = DescriptorExecutor::new(Arc::new(MockProcessInvoker::new()), unused_downloader())
            .execute(&task)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Configuration));
    }

    #[tokio::test]
    async fn test_release_diff_passes_previous_data_and_date() {
        let dir = tempfile::tempdir().unwrap();
        let previous_root = dir.path().join("prev/output");
        std::fs::create_dir_all(previous_root.join("release/metadata")).unwrap();
        std::fs::write(previous_root.join("release/built_with_change_types.tsv"), table(3)).unwrap();
        metadata::write_version_metadata(
            &previous_root.join("release/metadata/version.json"),
            &metadata::VersionMetadata::new(chrono::NaiveDate::from_ymd_opt(2023, 9, 4).unwrap(), ""),
        )
        .unwrap();
        let previous_tar = dir.path().join("prev/release-09-04-23.tar.gz");
        archive::create_archive(&previous_root, &previous_tar).unwrap();

        let task = resolve(
            vec![StageDescriptor::new(
                "diff",
                crate::core::StageKind::Release,
                StageAction::ReleaseDiff(DiffSpec {
                    previous_member: "release/built_with_change_types.tsv".into(),
                    command: CommandTemplate::python("releaseDiff.py").args([
                        "--v1",
                        "{previous_data}",
                        "--v1_release_date",
                        "{previous_release_date}",
                        "--output",
                        "{output}",
                    ]),
                }),
            )
            .with_output("{release_dir}/built_with_change_types.tsv")],
            "diff",
            params(dir.path()).with_previous_release_tar(&previous_tar),
        );

        let mut invoker = MockProcessInvoker::new();
        invoker
            .expect_invoke()
            .withf(|inv| inv.args[4] == "09-04-2023" && inv.args[2].ends_with("built_with_change_types.tsv"))
            .returning(|inv| {
                let previous = std::fs::read_to_string(&inv.args[2]).unwrap();
                std::fs::write(&inv.args[6], previous).unwrap();
                Ok(ok_output())
            });

        let result = DescriptorExecutor::new(Arc::new(invoker), unused_downloader())
            .execute(&task)
            .await;
        assert!(result.is_success(), "{:?}", result.failure);
    }

    #[tokio::test]
    async fn test_version_metadata_and_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "Adds gnomAD v3").unwrap();
        let p = params(dir.path())
            .with_date(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
            .with_release_notes(notes.display().to_string());

        let version = resolve(
            vec![StageDescriptor::new("version", crate::core::StageKind::Release, StageAction::VersionMetadata)
                .with_output("{metadata_dir}/version.json")],
            "version",
            p.clone(),
        );
        let executor = DescriptorExecutor::new(Arc::new(MockProcessInvoker::new()), unused_downloader());
        assert!(executor.execute(&version).await.is_success());
        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("output/release/metadata/version.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["date"], "2024-06-01");
        assert_eq!(json["notes"], "Adds gnomAD v3");

        let sums = resolve(
            vec![StageDescriptor::new(
                "md5",
                crate::core::StageKind::Release,
                StageAction::Checksums {
                    root: "{output_dir}".into(),
                },
            )
            .with_output("{output_dir}/md5sums.txt")],
            "md5",
            p,
        );
        assert!(executor.execute(&sums).await.is_success());
        let text = std::fs::read_to_string(dir.path().join("output/md5sums.txt")).unwrap();
        assert!(text.contains("release/metadata/version.json"));
        assert!(!text.contains("md5sums.txt"));
    }
}
