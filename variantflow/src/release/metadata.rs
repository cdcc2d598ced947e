//! Release version metadata (`version.json`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Date format stored in `version.json`.
pub const VERSION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Contents of `version.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// Release date, `YYYY-MM-DD`.
    pub date: String,
    /// Free-text release notes.
    #[serde(default)]
    pub notes: String,
}

impl VersionMetadata {
    /// Metadata for a release on `date`.
    #[must_use]
    pub fn new(date: NaiveDate, notes: impl Into<String>) -> Self {
        Self {
            date: date.format(VERSION_DATE_FORMAT).to_string(),
            notes: notes.into(),
        }
    }

    /// Parses the stored date.
    pub fn release_date(&self) -> io::Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, VERSION_DATE_FORMAT)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Writes `version.json`.
pub fn write_version_metadata(path: &Path, metadata: &VersionMetadata) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(metadata).map_err(io::Error::from)?;
    std::fs::write(path, json)
}

/// Reads the release date from a `version.json`.
pub fn read_release_date(path: &Path) -> io::Result<NaiveDate> {
    let text = std::fs::read_to_string(path)?;
    let metadata: VersionMetadata = serde_json::from_str(&text).map_err(io::Error::from)?;
    metadata.release_date()
}
