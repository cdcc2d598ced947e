//! Checkpoint stores answering "does this artifact exist".

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Backend answering whether a Target path is complete.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns true if the artifact at `key` exists and is populated.
    async fn exists(&self, key: &Path) -> bool;

    /// Records that the artifact at `key` is complete.
    async fn mark_complete(&self, key: &Path);
}

/// The filesystem is the checkpoint log.
///
/// A regular file counts when its size is nonzero; a directory counts when it
/// exists. Marking is a no-op because the artifact itself is the marker. A
/// partially written nonzero file passes this check.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCheckpointStore;

impl FsCheckpointStore {
    /// Creates a new filesystem store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn exists(&self, key: &Path) -> bool {
        match tokio::fs::metadata(key).await {
            Ok(meta) if meta.is_dir() => true,
            Ok(meta) => meta.len() > 0,
            Err(_) => false,
        }
    }

    async fn mark_complete(&self, _key: &Path) {}
}

/// In-memory checkpoint store for tests.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    complete: Mutex<HashSet<PathBuf>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given keys already complete.
    #[must_use]
    pub fn with_complete<I, P>(keys: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            complete: Mutex::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Forgets a key, as if its artifact had been removed.
    pub fn invalidate(&self, key: &Path) {
        self.complete.lock().remove(key);
    }

    /// Returns the number of complete keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.complete.lock().len()
    }

    /// Returns true if no key is complete.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.complete.lock().is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn exists(&self, key: &Path) -> bool {
        self.complete.lock().contains(key)
    }

    async fn mark_complete(&self, key: &Path) {
        self.complete.lock().insert(key.to_path_buf());
    }
}
