//! Filesystem fixtures.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::ParamContext;

/// A tab-separated table with a header and `rows` body rows.
#[must_use]
pub fn tsv_table(rows: usize) -> String {
    let mut text = String::from("Genomic_Coordinate_hg38\tSource\n");
    for i in 0..rows {
        let _ = writeln!(text, "chr17:g.{}:A>G\tFixture", 43_044_295 + i);
    }
    text
}

/// A temporary directory laid out like a pipeline root.
///
/// ```text
/// <root>/output   output_dir
/// <root>/work     file_parent_dir
/// <root>/methods  methods_dir
/// <root>/resources
/// ```
#[derive(Debug)]
pub struct TestWorkspace {
    dir: tempfile::TempDir,
}

impl TestWorkspace {
    /// Creates the workspace.
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        for sub in ["output", "work", "methods", "resources"] {
            std::fs::create_dir_all(dir.path().join(sub))?;
        }
        Ok(Self { dir })
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A path below the root.
    #[must_use]
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Parameters pointing into the workspace.
    #[must_use]
    pub fn params(&self) -> ParamContext {
        ParamContext::new()
            .with_output_dir(self.path("output"))
            .with_file_parent_dir(self.path("work"))
            .with_methods_dir(self.path("methods"))
            .with_resources_dir(self.path("resources"))
    }

    /// Writes a file below the root, creating parents.
    pub fn write(&self, rel: impl AsRef<Path>, content: impl AsRef<[u8]>) -> std::io::Result<PathBuf> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Returns true if the file exists and is nonempty.
    #[must_use]
    pub fn is_populated(&self, rel: impl AsRef<Path>) -> bool {
        std::fs::metadata(self.path(rel)).is_ok_and(|m| m.len() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_layout() {
        let ws = TestWorkspace::new().unwrap();
        let params = ws.params();
        assert_eq!(params.output_dir, ws.path("output"));
        assert!(ws.path("work").is_dir());

        ws.write("work/t.tsv", tsv_table(2)).unwrap();
        assert!(ws.is_populated("work/t.tsv"));
        assert_eq!(std::fs::read_to_string(ws.path("work/t.tsv")).unwrap().lines().count(), 3);
    }
}
