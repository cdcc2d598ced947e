//! Subordinate process invocation.
//!
//! Every call gets an explicit working directory and argument list; the
//! engine never changes its own working directory.

use crate::core::InvocationRecord;
use crate::errors::InvokeError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// A fully rendered external program call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory; inherits the engine's when `None`.
    pub cwd: Option<PathBuf>,
    /// File receiving standard output instead of a pipe.
    pub stdout_path: Option<PathBuf>,
}

impl Invocation {
    /// Creates an invocation of `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Sets the arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Redirects standard output into a file.
    #[must_use]
    pub fn with_stdout_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_path = Some(path.into());
        self
    }

    /// The command line as one string, for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output (empty when redirected).
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ProcessOutput {
    /// Converts into a record for a stage result.
    #[must_use]
    pub fn into_record(self, invocation: &Invocation) -> InvocationRecord {
        InvocationRecord {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            exit_code: self.exit_code,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Runs external programs to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    /// Runs the invocation and waits for it to exit.
    ///
    /// A nonzero exit is not an error here; only failing to run at all is.
    async fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput, InvokeError>;
}

/// Runs programs with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessInvoker;

impl SystemProcessInvoker {
    /// Creates a new invoker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessInvoker for SystemProcessInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput, InvokeError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref cwd) = invocation.cwd {
            cmd.current_dir(cwd);
        }

        match invocation.stdout_path {
            Some(ref path) => {
                let file = std::fs::File::create(path).map_err(|source| InvokeError::Redirect {
                    path: path.clone(),
                    source,
                })?;
                cmd.stdout(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        tracing::info!(command = %invocation.command_line(), cwd = ?invocation.cwd, "Running external program");

        let child = cmd.spawn().map_err(|source| InvokeError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|source| InvokeError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let result = ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(
            program = %invocation.program,
            exit_code = ?result.exit_code,
            stdout = %result.stdout,
            stderr = %result.stderr,
            "External program finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_streams_and_exit_code() {
        let invocation = Invocation::new("sh").with_args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = SystemProcessInvoker::new().invoke(&invocation).await.unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_explicit_cwd_and_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pwd.txt");
        let invocation = Invocation::new("pwd")
            .with_cwd(dir.path())
            .with_stdout_path(&out);

        let output = SystemProcessInvoker::new().invoke(&invocation).await.unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.is_empty());

        let written = std::fs::read_to_string(&out).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(written.trim()).canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let invocation = Invocation::new("definitely-not-a-real-program-xyz");
        let err = SystemProcessInvoker::new().invoke(&invocation).await.unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }));
    }

    #[test]
    fn test_command_line() {
        let invocation = Invocation::new("python").with_args(["sort.py", "-i", "in.vcf"]);
        assert_eq!(invocation.command_line(), "python sort.py -i in.vcf");
    }

    #[test]
    fn test_into_record() {
        let invocation = Invocation::new("tabix").with_args(["-h"]);
        let record = ProcessOutput {
            exit_code: Some(0),
            stdout: "x".into(),
            stderr: String::new(),
        }
        .into_record(&invocation);
        assert_eq!(record.program, "tabix");
        assert!(!record.exited_abnormally());
    }
}
