//! Record-count validation gate.
//!
//! A filtering transformation must satisfy
//! `output_rows == input_rows - removed_rows`, where the removed count is
//! read from the last log line carrying a marker (by default
//! `ERROR COUNT`). Tables are tab-separated with one header row; only body
//! rows are counted.

use crate::core::RecordCounts;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Marker of the log line carrying the removed-record count.
pub const DEFAULT_REMOVED_COUNT_MARKER: &str = "ERROR COUNT";

static DIGIT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d").ok());

/// Why validation could not pass.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A table could not be read.
    #[error("Could not read {path}: {message}")]
    Unreadable {
        /// Table path.
        path: PathBuf,
        /// Underlying error text.
        message: String,
    },

    /// The counts disagree.
    #[error("{}", mismatch_message(.counts))]
    Mismatch {
        /// The counts observed.
        counts: RecordCounts,
    },
}

fn mismatch_message(counts: &RecordCounts) -> String {
    format!(
        "Expected {} records ({} input - {} removed) but found {}",
        counts.input.saturating_sub(counts.removed),
        counts.input,
        counts.removed,
        counts.output
    )
}

/// Counts body rows of a tab-separated table with a header row.
pub fn count_records(path: &Path) -> Result<usize, ValidationError> {
    let unreadable = |message: String| ValidationError::Unreadable {
        path: path.to_path_buf(),
        message,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .map_err(|e| unreadable(e.to_string()))?;

    let mut count = 0;
    for record in reader.byte_records() {
        record.map_err(|e| unreadable(e.to_string()))?;
        count += 1;
    }
    Ok(count)
}

/// Extracts the removed count from log text.
///
/// Every digit on the last line containing `marker` is concatenated, so a
/// later count supersedes an earlier one. No such line, or no digits on it,
/// means nothing was removed.
#[must_use]
pub fn parse_removed_count(text: &str, marker: &str) -> usize {
    let Some(line) = text.lines().rev().find(|l| l.contains(marker)) else {
        return 0;
    };
    let Some(re) = DIGIT.as_ref() else {
        return 0;
    };
    let digits: String = re.find_iter(line).map(|m| m.as_str()).collect();
    digits.parse().unwrap_or(0)
}

/// Reads the removed count from a log file. A missing log counts as zero.
pub async fn read_removed_count(log: &Path, marker: &str) -> usize {
    match tokio::fs::read_to_string(log).await {
        Ok(text) => parse_removed_count(&text, marker),
        Err(e) => {
            tracing::debug!(log = %log.display(), error = %e, "No removed-count log");
            0
        }
    }
}

/// Applies the count check to one input/output pair.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    marker: String,
}

impl Default for ValidationGate {
    fn default() -> Self {
        Self::new(DEFAULT_REMOVED_COUNT_MARKER)
    }
}

impl ValidationGate {
    /// Creates a gate reading removed counts after `marker`.
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// The log marker in use.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Checks `output` against `input` and an optional removed-count log.
    pub async fn check(
        &self,
        input: &Path,
        output: &Path,
        removed_log: Option<&Path>,
    ) -> Result<RecordCounts, ValidationError> {
        let removed = match removed_log {
            Some(log) => read_removed_count(log, &self.marker).await,
            None => 0,
        };
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        let counted = tokio::task::spawn_blocking(move || {
            Ok::<_, ValidationError>((count_records(&input)?, count_records(&output)?))
        })
        .await
        .map_err(|e| ValidationError::Unreadable {
            path: PathBuf::new(),
            message: e.to_string(),
        })??;

        check_counts(counted.0, counted.1, removed)
    }
}

/// Accepts exactly `output == input - removed`.
pub fn check_counts(input: usize, output: usize, removed: usize) -> Result<RecordCounts, ValidationError> {
    let counts = RecordCounts {
        input,
        output,
        removed,
    };
    if counts.holds() {
        Ok(counts)
    } else {
        Err(ValidationError::Mismatch { counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    fn table(rows: usize) -> String {
        let mut text = String::from("Genomic_Coordinate\tSource\n");
        for i in 0..rows {
            writeln!(text, "chr13:g.{i}:A>G\tClinVar").unwrap();
        }
        text
    }

    #[test]
    fn test_count_records_excludes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tsv");
        std::fs::write(&path, table(7)).unwrap();
        assert_eq!(count_records(&path).unwrap(), 7);
    }

    #[test]
    fn test_count_records_missing_file() {
        assert!(matches!(
            count_records(Path::new("/nonexistent/table.tsv")),
            Err(ValidationError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_parse_removed_count() {
        let log = "starting\nERROR COUNT: 9\nERROR COUNT: 5\ndone\n";
        assert_eq!(parse_removed_count(log, DEFAULT_REMOVED_COUNT_MARKER), 5);
        assert_eq!(parse_removed_count("ERROR COUNT 1,204", DEFAULT_REMOVED_COUNT_MARKER), 1204);
        assert_eq!(parse_removed_count("no marker here 12", DEFAULT_REMOVED_COUNT_MARKER), 0);
        assert_eq!(parse_removed_count("ERROR COUNT: none", DEFAULT_REMOVED_COUNT_MARKER), 0);
        assert_eq!(parse_removed_count("DROPPED 3", "DROPPED"), 3);
    }

    #[test]
    fn test_check_counts_exact() {
        assert!(check_counts(100, 95, 5).is_ok());
        assert!(check_counts(100, 96, 5).is_err());
        assert!(check_counts(100, 94, 5).is_err());
        assert!(check_counts(100, 100, 0).is_ok());
        assert!(check_counts(3, 0, 5).is_err());
    }

    #[test]
    fn test_mismatch_message() {
        let err = check_counts(100, 96, 5).unwrap_err();
        assert_eq!(err.to_string(), "Expected 95 records (100 input - 5 removed) but found 96");
    }

    #[tokio::test]
    async fn test_gate_reads_log() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.tsv");
        let output = dir.path().join("out.tsv");
        let log = dir.path().join("filter.log");
        std::fs::write(&input, table(100)).unwrap();
        std::fs::write(&output, table(95)).unwrap();
        std::fs::write(&log, "filtering\nERROR COUNT: 5\n").unwrap();

        let gate = ValidationGate::default();
        let counts = gate.check(&input, &output, Some(&log)).await.unwrap();
        assert_eq!(counts.removed, 5);

        assert!(gate.check(&input, &output, None).await.is_err());
        assert!(gate
            .check(&input, &output, Some(&dir.path().join("missing.log")))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_gate_uses_last_count_line() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.tsv");
        let output = dir.path().join("out.tsv");
        let log = dir.path().join("add-annotation.log");
        std::fs::write(&input, table(100)).unwrap();
        std::fs::write(&output, table(95)).unwrap();
        std::fs::write(&log, "ERROR COUNT: 1\nERROR COUNT: 2\nERROR COUNT: 5\n").unwrap();

        let counts = ValidationGate::default()
            .check(&input, &output, Some(&log))
            .await
            .unwrap();
        assert_eq!(counts.removed, 5);
        assert_eq!(counts.output, 95);
    }
}
