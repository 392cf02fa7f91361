//! Storage abstraction for the mirror.
//!
//! The [`Store`] trait defines every persistence operation the ingestion
//! pipeline needs, so the dispatcher can run against SQLite in production
//! and [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to be shared with the worker task.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_repository`](Store::ensure_repository) | Insert a repository if absent |
//! | [`update_repository`](Store::update_repository) | Apply a targeted field change |
//! | [`touch_repository`](Store::touch_repository) | Set last-activity timestamp |
//! | [`find_commit`](Store::find_commit) | Look up a commit by `(repository, sha)` |
//! | [`insert_commit`](Store::insert_commit) | Insert-or-ignore a commit |
//! | [`upsert_file`](Store::upsert_file) | Insert or replace a path's record |
//! | [`delete_file`](Store::delete_file) | Remove a path's record |
//! | [`count_blob_references`](Store::count_blob_references) | Records pointing at a blob |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Commit, FileRecord, Repository, RepositoryUpdate};

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert the repository unless a row with the same id exists.
    ///
    /// Returns `true` when a row was inserted.
    async fn ensure_repository(&self, repo: &Repository) -> Result<bool>;

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>>;

    /// Apply a targeted update. Returns `false` if the repository is unknown.
    async fn update_repository(&self, id: &str, update: &RepositoryUpdate) -> Result<bool>;

    async fn touch_repository(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn find_commit(&self, repository_id: &str, sha: &str) -> Result<Option<Commit>>;

    /// Insert a commit, ignoring a conflicting `(repository_id, sha)`.
    ///
    /// Returns `true` when a row was inserted.
    async fn insert_commit(&self, commit: &Commit) -> Result<bool>;

    /// Commits for a repository, oldest first.
    async fn list_commits(&self, repository_id: &str) -> Result<Vec<Commit>>;

    /// Insert or replace the record for `(repository_id, path)`.
    ///
    /// Returns the record that was replaced, if any.
    async fn upsert_file(&self, file: &FileRecord) -> Result<Option<FileRecord>>;

    /// Delete the record for `(repository_id, path)`, returning it.
    async fn delete_file(&self, repository_id: &str, path: &str) -> Result<Option<FileRecord>>;

    async fn get_file(&self, repository_id: &str, path: &str) -> Result<Option<FileRecord>>;

    /// File records for a repository, ordered by path.
    async fn list_files(&self, repository_id: &str) -> Result<Vec<FileRecord>>;

    /// Number of file records (across all repositories) using `blob_reference`.
    async fn count_blob_references(&self, blob_reference: &str) -> Result<usize>;
}
