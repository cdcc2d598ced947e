//! Running stages: external programs, downloads and the descriptor interpreter.

pub mod download;
pub mod executor;
pub mod process;

pub use download::{fetch_with_retry, Downloader, FetchRequest, HttpDownloader};
pub use executor::{DescriptorExecutor, StageExecutor};
pub use process::{Invocation, ProcessInvoker, ProcessOutput, SystemProcessInvoker};
