//! Network downloads with bounded retry.

use crate::errors::DownloadError;
use crate::pipeline::{with_retry, RetryConfig, RetryOutcome};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// One payload to fetch.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Source URL.
    pub url: String,
    /// Destination file.
    pub dest: PathBuf,
    /// Basic-auth username and password.
    pub credentials: Option<(String, String)>,
}

impl std::fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("url", &self.url)
            .field("dest", &self.dest)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

impl FetchRequest {
    /// Fetches `url` into `dest`.
    #[must_use]
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            credentials: None,
        }
    }

    /// Sends basic authentication.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Performs a single download attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetches the payload, returning the number of bytes written.
    async fn fetch(&self, request: &FetchRequest) -> Result<u64, DownloadError>;
}

/// HTTP(S) downloader backed by `reqwest`.
///
/// The payload is streamed into `<dest>.part` and renamed into place once
/// the body is complete, so a failed attempt never leaves a populated Target.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDownloader {
    /// Creates a downloader with a five minute request timeout.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, request: &FetchRequest) -> Result<u64, DownloadError> {
        let url = request.url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DownloadError::UnsupportedScheme(url.to_string()));
        }

        let transport = |e: reqwest::Error| DownloadError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut builder = self.client.get(url);
        if let Some((ref user, ref password)) = request.credentials {
            builder = builder.basic_auth(user, Some(password));
        }
        let mut response = builder.send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let io_err = |source: std::io::Error| DownloadError::Io {
            path: request.dest.clone(),
            source,
        };
        if let Some(parent) = request.dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let part = part_path(&request.dest);
        let mut file = tokio::fs::File::create(&part).await.map_err(io_err)?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&part, &request.dest).await.map_err(io_err)?;

        tracing::debug!(url, dest = %request.dest.display(), bytes = written, "Downloaded");
        Ok(written)
    }
}

/// Fetches with the retry policy: the downloader is called at most
/// `max_attempts` times, pausing between failed attempts.
pub async fn fetch_with_retry(
    downloader: &dyn Downloader,
    request: &FetchRequest,
    retry: &RetryConfig,
) -> RetryOutcome<u64, DownloadError> {
    with_retry(retry, &request.url, |attempt| async move {
        tracing::debug!(url = %request.url, attempt, "Download attempt");
        downloader.fetch(request).await
    })
    .await
}
