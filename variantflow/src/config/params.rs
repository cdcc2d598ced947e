//! The immutable parameter context shared by every task of a run.
//!
//! A [`ParamContext`] is created once per invocation and shared behind an
//! `Arc`. Dependency edges may carry [`ParamOverrides`]; applying them yields
//! a new context for the upstream task and leaves the original untouched, so
//! a value already seen by one sibling can never change under another.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result of looking up a named parameter for template rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The parameter is known and set.
    Value(String),
    /// The parameter is known but optional and unset.
    Unset,
    /// No parameter has this name.
    Unknown,
}

/// Configuration shared by all tasks in a run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamContext {
    /// Release date; also names the archive.
    pub date: NaiveDate,
    /// User for authenticated downloads.
    pub username: Option<String>,
    /// Password for authenticated downloads. Never part of a task identity.
    pub password: Option<String>,
    /// Reference genomes, liftover chains and annotation files.
    pub resources_dir: PathBuf,
    /// Root of the persisted output tree.
    pub output_dir: PathBuf,
    /// The output directory as seen from a container host, if different.
    pub output_dir_host: Option<PathBuf>,
    /// Working/staging directory for per-source intermediates.
    pub file_parent_dir: PathBuf,
    /// Directory holding the external transformation programs.
    pub methods_dir: PathBuf,
    /// Previous release archive to diff against.
    pub previous_release_tar: Option<PathBuf>,
    /// Reference data for the priors calculation.
    pub priors_references_dir: Option<PathBuf>,
    /// Container image running the priors calculation.
    pub priors_docker_image_name: Option<String>,
    /// Release notes: a path to a notes file or literal text.
    pub release_notes: Option<String>,
    /// Additional named values available to templates.
    pub extras: BTreeMap<String, String>,
}

impl Default for ParamContext {
    fn default() -> Self {
        Self {
            date: chrono::Local::now().date_naive(),
            username: None,
            password: None,
            resources_dir: PathBuf::from("resources"),
            output_dir: PathBuf::from("pipeline-data/output"),
            output_dir_host: None,
            file_parent_dir: PathBuf::from("pipeline-data/work"),
            methods_dir: PathBuf::from("methods"),
            previous_release_tar: None,
            priors_references_dir: None,
            priors_docker_image_name: None,
            release_notes: None,
            extras: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for ParamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamContext")
            .field("date", &self.date)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("resources_dir", &self.resources_dir)
            .field("output_dir", &self.output_dir)
            .field("output_dir_host", &self.output_dir_host)
            .field("file_parent_dir", &self.file_parent_dir)
            .field("methods_dir", &self.methods_dir)
            .field("previous_release_tar", &self.previous_release_tar)
            .field("priors_references_dir", &self.priors_references_dir)
            .field("priors_docker_image_name", &self.priors_docker_image_name)
            .field("release_notes", &self.release_notes)
            .field("extras", &self.extras)
            .finish()
    }
}

impl ParamContext {
    /// Creates a context with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the release date.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_file_parent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_parent_dir = dir.into();
        self
    }

    /// Sets the resources directory.
    #[must_use]
    pub fn with_resources_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resources_dir = dir.into();
        self
    }

    /// Sets the methods directory.
    #[must_use]
    pub fn with_methods_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.methods_dir = dir.into();
        self
    }

    /// Sets the previous release archive.
    #[must_use]
    pub fn with_previous_release_tar(mut self, path: impl Into<PathBuf>) -> Self {
        self.previous_release_tar = Some(path.into());
        self
    }

    /// Sets the release notes.
    #[must_use]
    pub fn with_release_notes(mut self, notes: impl Into<String>) -> Self {
        self.release_notes = Some(notes.into());
        self
    }

    /// Sets download credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Adds an extra named value.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// The host-side output directory, falling back to `output_dir`.
    #[must_use]
    pub fn output_dir_host(&self) -> &Path {
        self.output_dir_host.as_deref().unwrap_or(&self.output_dir)
    }

    /// `<output_dir>/release`.
    #[must_use]
    pub fn release_dir(&self) -> PathBuf {
        self.output_dir.join("release")
    }

    /// `<output_dir>/release/artifacts`.
    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.release_dir().join("artifacts")
    }

    /// `<output_dir>/release/diff`.
    #[must_use]
    pub fn diff_dir(&self) -> PathBuf {
        self.release_dir().join("diff")
    }

    /// `<output_dir>/release/metadata`.
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.release_dir().join("metadata")
    }

    /// Parent of the output directory, where the archive lands.
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.output_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Looks up a parameter by template name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Lookup {
        fn path(p: &Path) -> Lookup {
            Lookup::Value(p.display().to_string())
        }
        fn opt<T: AsRef<str>>(v: Option<T>) -> Lookup {
            v.map_or(Lookup::Unset, |s| Lookup::Value(s.as_ref().to_string()))
        }

        match name {
            "date" => Lookup::Value(self.date.format("%Y-%m-%d").to_string()),
            "date_mdy" => Lookup::Value(self.date.format("%m-%d-%y").to_string()),
            "username" => opt(self.username.as_deref()),
            "password" => opt(self.password.as_deref()),
            "resources_dir" => path(&self.resources_dir),
            "output_dir" => path(&self.output_dir),
            "output_dir_host" => path(self.output_dir_host()),
            "file_parent_dir" => path(&self.file_parent_dir),
            "methods_dir" => path(&self.methods_dir),
            "release_dir" => path(&self.release_dir()),
            "artifacts_dir" => path(&self.artifacts_dir()),
            "artifacts_dir_host" => path(&self.output_dir_host().join("release").join("artifacts")),
            "diff_dir" => path(&self.diff_dir()),
            "metadata_dir" => path(&self.metadata_dir()),
            "archive_dir" => path(&self.archive_dir()),
            "previous_release_tar" => opt(
                self.previous_release_tar
                    .as_ref()
                    .map(|p| p.display().to_string()),
            ),
            "priors_references_dir" => opt(
                self.priors_references_dir
                    .as_ref()
                    .map(|p| p.display().to_string()),
            ),
            "priors_docker_image_name" => opt(self.priors_docker_image_name.as_deref()),
            "release_notes" => opt(self.release_notes.as_deref()),
            other => self
                .extras
                .get(other)
                .map_or(Lookup::Unknown, |v| Lookup::Value(v.clone())),
        }
    }

    /// Returns a new context with the overrides applied.
    #[must_use]
    pub fn apply(&self, overrides: &ParamOverrides) -> Self {
        let mut next = self.clone();
        if let Some(date) = overrides.date {
            next.date = date;
        }
        if let Some(ref dir) = overrides.output_dir {
            next.output_dir.clone_from(dir);
        }
        if let Some(ref dir) = overrides.file_parent_dir {
            next.file_parent_dir.clone_from(dir);
        }
        if let Some(ref dir) = overrides.resources_dir {
            next.resources_dir.clone_from(dir);
        }
        for (key, value) in &overrides.extras {
            next.extras.insert(key.clone(), value.clone());
        }
        next
    }

    /// Stable fingerprint of every significant parameter.
    ///
    /// The password is excluded so that a credential change does not move
    /// Target paths or task identities.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.remove("password");
        }
        hash_parameters(&value)
    }
}

/// Per-edge replacement values for a dependency's context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamOverrides {
    /// Replacement release date.
    pub date: Option<NaiveDate>,
    /// Replacement output directory.
    pub output_dir: Option<PathBuf>,
    /// Replacement working directory.
    pub file_parent_dir: Option<PathBuf>,
    /// Replacement resources directory.
    pub resources_dir: Option<PathBuf>,
    /// Extra values inserted or replaced.
    pub extras: BTreeMap<String, String>,
}

impl ParamOverrides {
    /// Creates empty overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if applying would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.output_dir.is_none()
            && self.file_parent_dir.is_none()
            && self.resources_dir.is_none()
            && self.extras.is_empty()
    }

    /// Overrides the release date.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Overrides the working directory.
    #[must_use]
    pub fn with_file_parent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_parent_dir = Some(dir.into());
        self
    }

    /// Inserts or replaces an extra value.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// Hashes a JSON value to a short hex digest.
#[must_use]
pub fn hash_parameters(params: &serde_json::Value) -> String {
    let json = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}
