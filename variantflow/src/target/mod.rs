//! Completion oracle.
//!
//! A [`Target`] names the artifact(s) a task promises to produce. A task is
//! complete iff every path of its Target exists according to a
//! [`CheckpointStore`]. There is no other run log.

mod checkpoint;

pub use checkpoint::{CheckpointStore, FsCheckpointStore, InMemoryCheckpointStore};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The declared output of a task: one path or a named mapping of paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// A single artifact.
    Single(PathBuf),
    /// Several artifacts addressed by name.
    Named(BTreeMap<String, PathBuf>),
}

impl Target {
    /// Creates a single-path target.
    #[must_use]
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self::Single(path.into())
    }

    /// Creates a named target from `(name, path)` pairs.
    #[must_use]
    pub fn named<I, K, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<PathBuf>,
    {
        Self::Named(
            entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        )
    }

    /// Every path of the target, in name order for named targets.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Single(path) => vec![path.as_path()],
            Self::Named(map) => map.values().map(PathBuf::as_path).collect(),
        }
    }

    /// The path when this is a single target.
    #[must_use]
    pub fn as_single(&self) -> Option<&Path> {
        match self {
            Self::Single(path) => Some(path),
            Self::Named(_) => None,
        }
    }

    /// The path stored under `name` in a named target.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Path> {
        match self {
            Self::Single(_) => None,
            Self::Named(map) => map.get(name).map(PathBuf::as_path),
        }
    }

    /// Returns true iff every path exists in the store.
    pub async fn is_complete(&self, store: &dyn CheckpointStore) -> bool {
        for path in self.paths() {
            if !store.exists(path).await {
                return false;
            }
        }
        true
    }

    /// Paths that do not exist in the store.
    pub async fn missing(&self, store: &dyn CheckpointStore) -> Vec<PathBuf> {
        let mut missing = Vec::new();
        for path in self.paths() {
            if !store.exists(path).await {
                missing.push(path.to_path_buf());
            }
        }
        missing
    }

    /// Marks every path complete in the store.
    pub async fn mark_complete(&self, store: &dyn CheckpointStore) {
        for path in self.paths() {
            store.mark_complete(path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_single_target_completion() {
        let store = InMemoryCheckpointStore::new();
        let target = Target::single("/out/ClinVar.vcf");

        assert!(!target.is_complete(&store).await);
        target.mark_complete(&store).await;
        assert!(target.is_complete(&store).await);
    }

    #[tokio::test]
    async fn test_named_target_requires_every_path() {
        let store = InMemoryCheckpointStore::new();
        let target = Target::named([("chr13", "/w/esp/chr13.vcf"), ("chr17", "/w/esp/chr17.vcf")]);

        store.mark_complete(Path::new("/w/esp/chr13.vcf")).await;
        assert!(!target.is_complete(&store).await);
        assert_eq!(target.missing(&store).await, vec![PathBuf::from("/w/esp/chr17.vcf")]);

        store.mark_complete(Path::new("/w/esp/chr17.vcf")).await;
        assert!(target.is_complete(&store).await);
    }

    #[test]
    fn test_accessors() {
        let single = Target::single("/a");
        assert_eq!(single.as_single(), Some(Path::new("/a")));
        assert_eq!(single.get("x"), None);

        let named = Target::named([("b", "/b"), ("a", "/a")]);
        assert_eq!(named.as_single(), None);
        assert_eq!(named.get("b"), Some(Path::new("/b")));
        assert_eq!(named.paths(), vec![Path::new("/a"), Path::new("/b")]);
    }
}
