//! Fakes for the process, download and executor seams.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{FailureKind, StageFailure, StageResult};
use crate::errors::{DownloadError, InvokeError};
use crate::invoke::{Downloader, FetchRequest, Invocation, ProcessInvoker, ProcessOutput, StageExecutor};
use crate::pipeline::TaskInstance;

/// A process invoker that writes files instead of running programs.
///
/// Each invocation writes the default content to its stdout redirect and to
/// every argument following an output flag (`-o`, `--output` by default).
/// Individual paths can be given their own content, e.g. empty bytes.
#[derive(Debug)]
pub struct ScriptedInvoker {
    default_content: Vec<u8>,
    output_flags: Vec<String>,
    files: HashMap<PathBuf, Vec<u8>>,
    failing_programs: HashSet<String>,
    invocations: Mutex<Vec<Invocation>>,
}

impl Default for ScriptedInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedInvoker {
    /// Creates an invoker writing `scripted output` to every output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_content: b"scripted output\n".to_vec(),
            output_flags: vec!["-o".to_string(), "--output".to_string()],
            files: HashMap::new(),
            failing_programs: HashSet::new(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Sets the content written to outputs without their own content.
    #[must_use]
    pub fn with_default_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.default_content = content.into();
        self
    }

    /// Also treats the argument after `flag` as an output path.
    #[must_use]
    pub fn with_output_flag(mut self, flag: impl Into<String>) -> Self {
        self.output_flags.push(flag.into());
        self
    }

    /// Writes `content` whenever `path` is an output.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Makes invocations of `program` fail to spawn.
    #[must_use]
    pub fn failing(mut self, program: impl Into<String>) -> Self {
        self.failing_programs.insert(program.into());
        self
    }

    /// Every invocation received, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Number of invocations whose arguments contain `needle`.
    #[must_use]
    pub fn count_matching(&self, needle: &str) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|inv| inv.args.iter().any(|a| a.contains(needle)))
            .count()
    }

    fn outputs_of(&self, invocation: &Invocation) -> Vec<PathBuf> {
        let mut outputs: Vec<PathBuf> = invocation.stdout_path.iter().cloned().collect();
        for pair in invocation.args.windows(2) {
            if self.output_flags.iter().any(|f| *f == pair[0]) {
                let path = PathBuf::from(&pair[1]);
                outputs.push(match invocation.cwd {
                    Some(ref cwd) if path.is_relative() => cwd.join(path),
                    _ => path,
                });
            }
        }
        outputs
    }

    fn content_for(&self, path: &Path) -> &[u8] {
        self.files.get(path).map_or(&self.default_content, Vec::as_slice)
    }
}

#[async_trait]
impl ProcessInvoker for ScriptedInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput, InvokeError> {
        self.invocations.lock().push(invocation.clone());
        if self.failing_programs.contains(&invocation.program) {
            return Err(InvokeError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        for path in self.outputs_of(invocation) {
            let written = path
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .and_then(|()| std::fs::write(&path, self.content_for(&path)));
            if let Err(source) = written {
                return Err(InvokeError::Redirect { path, source });
            }
        }

        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// A downloader that fails a fixed number of times per URL before writing
/// its content.
#[derive(Debug)]
pub struct FlakyDownloader {
    failures: usize,
    content: Vec<u8>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FlakyDownloader {
    /// Fails the first `failures` attempts of every URL.
    #[must_use]
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            content: b"downloaded\n".to_vec(),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// A downloader that always succeeds.
    #[must_use]
    pub fn reliable() -> Self {
        Self::new(0)
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    /// Attempts made for `url`.
    #[must_use]
    pub fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().get(url).copied().unwrap_or(0)
    }

    /// Attempts made over all URLs.
    #[must_use]
    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().values().sum()
    }
}

#[async_trait]
impl Downloader for FlakyDownloader {
    async fn fetch(&self, request: &FetchRequest) -> Result<u64, DownloadError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(request.url.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt <= self.failures {
            return Err(DownloadError::Transport {
                url: request.url.clone(),
                message: format!("connection reset (attempt {attempt})"),
            });
        }

        let io_err = |source| DownloadError::Io {
            path: request.dest.clone(),
            source,
        };
        if let Some(parent) = request.dest.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&request.dest, &self.content).map_err(io_err)?;
        Ok(self.content.len() as u64)
    }
}

/// An executor that records which stages ran and returns scripted results.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<String>>,
    failures: HashMap<String, FailureKind>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingExecutor {
    /// Creates an executor where every stage succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `stage` fail with `kind`.
    #[must_use]
    pub fn failing(mut self, stage: impl Into<String>, kind: FailureKind) -> Self {
        self.failures.insert(stage.into(), kind);
        self
    }

    /// Makes every execution take `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Stage names in the order execution started.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// How many times `stage` was executed.
    #[must_use]
    pub fn call_count(&self, stage: &str) -> usize {
        self.executed.lock().iter().filter(|s| *s == stage).count()
    }

    /// Highest number of executions observed running at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for RecordingExecutor {
    async fn execute(&self, task: &TaskInstance) -> StageResult {
        self.executed.lock().push(task.name().to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let result = StageResult::started(task.id.as_str(), task.name());
        match self.failures.get(task.name()) {
            Some(kind) => result.fail(StageFailure::new(*kind, "scripted failure")),
            None => result.succeed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_invoker_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a/out.tsv");
        let redirect = dir.path().join("b/stdout.txt");
        let invoker = ScriptedInvoker::new().with_file(&out, "");

        let invocation = Invocation::new("python")
            .with_args(["convert.py", "-o", out.to_str().unwrap()])
            .with_stdout_path(&redirect);
        invoker.invoke(&invocation).await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), Vec::<u8>::new());
        assert_eq!(std::fs::read_to_string(&redirect).unwrap(), "scripted output\n");
        assert_eq!(invoker.count_matching("convert.py"), 1);
    }

    #[tokio::test]
    async fn test_flaky_downloader_counts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = FlakyDownloader::new(1);
        let request = FetchRequest::new("https://example.org/a", dir.path().join("a"));

        assert!(downloader.fetch(&request).await.is_err());
        assert_eq!(downloader.fetch(&request).await.unwrap(), 11);
        assert_eq!(downloader.attempts("https://example.org/a"), 2);
    }
}
