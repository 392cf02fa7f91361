//! Persisted records for the repository mirror.
//!
//! These types represent what the pipeline writes: repositories, the commits
//! ingested from push events, and one [`FileRecord`] per live path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A mirrored repository.
///
/// `id` is the upstream repository id and never changes; `full_name`
/// (`owner/name`) is what the source host is addressed by and changes on
/// rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub full_name: String,
    pub private: bool,
    pub archived: bool,
    pub default_branch: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Targeted field change applied to a [`Repository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryUpdate {
    Visibility { private: bool },
    Rename { name: String, full_name: String },
    Archived(bool),
}

/// A commit ingested from a push event. Unique per `(repository_id, sha)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub repository_id: String,
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source_url: String,
    pub files_changed_count: i64,
}

/// Coarse category of a file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Code,
    Markup,
    Data,
    Documentation,
    Other,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Code => "code",
            FileKind::Markup => "markup",
            FileKind::Data => "data",
            FileKind::Documentation => "documentation",
            FileKind::Other => "other",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(FileKind::Code),
            "markup" => Ok(FileKind::Markup),
            "data" => Ok(FileKind::Data),
            "documentation" => Ok(FileKind::Documentation),
            "other" => Ok(FileKind::Other),
            other => anyhow::bail!("unknown file kind: '{}'", other),
        }
    }
}

/// Metadata for the latest processed content of one path.
///
/// Unique per `(repository_id, path)`. Absent when the most recent commit
/// touching the path removed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub repository_id: String,
    pub path: String,
    pub name: String,
    pub kind: FileKind,
    pub size: i64,
    pub language: Option<String>,
    pub blob_reference: String,
    /// Commit that last wrote this record.
    pub commit_sha: String,
    pub updated_at: DateTime<Utc>,
}

/// Last path segment, used as [`FileRecord::name`].
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
