//! Failure quarantine.
//!
//! A stage whose output exists but is empty has its artifact renamed in
//! place to `FAILED_<utc timestamp>_<original name>`, so the completion
//! check fails on the next run and the evidence is kept for inspection.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Prefix of quarantined artifact names.
pub const QUARANTINE_PREFIX: &str = "FAILED_";

/// The name `path` is moved to when quarantined at `at`.
#[must_use]
pub fn quarantine_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = at.format("%Y-%m-%dT%H:%M:%S%.6fZ");
    path.with_file_name(format!("{QUARANTINE_PREFIX}{stamp}_{name}"))
}

/// Returns true if the file name carries the quarantine prefix.
#[must_use]
pub fn is_quarantined(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with(QUARANTINE_PREFIX))
}

/// Renames `path` to its quarantine name and returns the new path.
pub async fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
    let dest = quarantine_path(path, Utc::now());
    tokio::fs::rename(path, &dest).await?;
    tracing::warn!(from = %path.display(), to = %dest.display(), "Quarantined artifact");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_quarantine_path() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 5).unwrap();
        let path = quarantine_path(Path::new("/work/ESP/esp.vcf"), at);
        assert_eq!(
            path,
            PathBuf::from("/work/ESP/FAILED_2024-06-01T12:30:05.000000Z_esp.vcf")
        );
        assert!(is_quarantined(&path));
        assert!(!is_quarantined(Path::new("/work/ESP/esp.vcf")));
    }

    #[tokio::test]
    async fn test_quarantine_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.vcf");
        std::fs::write(&path, b"").unwrap();

        let moved = quarantine(&path).await.unwrap();
        assert!(!path.exists());
        assert_eq!(moved.parent(), Some(dir.path()));
        assert_eq!(std::fs::read(&moved).unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_quarantine_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(quarantine(&dir.path().join("missing")).await.is_err());
    }
}
