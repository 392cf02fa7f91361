//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Keys are
//! `(repository_id, sha)` and `(repository_id, path)`, mirroring the
//! uniqueness constraints of the SQLite schema.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Commit, FileRecord, Repository, RepositoryUpdate};

use super::Store;

type Key = (String, String);

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    repositories: RwLock<BTreeMap<String, Repository>>,
    /// Commits keyed by `(repository_id, sha)`, with insertion order.
    commits: RwLock<BTreeMap<Key, (u64, Commit)>>,
    files: RwLock<BTreeMap<Key, FileRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn key(a: &str, b: &str) -> Key {
    (a.to_string(), b.to_string())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ensure_repository(&self, repo: &Repository) -> Result<bool> {
        let mut repos = write(&self.repositories)?;
        if repos.contains_key(&repo.id) {
            return Ok(false);
        }
        repos.insert(repo.id.clone(), repo.clone());
        Ok(true)
    }

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        Ok(read(&self.repositories)?.get(id).cloned())
    }

    async fn update_repository(&self, id: &str, update: &RepositoryUpdate) -> Result<bool> {
        let mut repos = write(&self.repositories)?;
        let Some(repo) = repos.get_mut(id) else {
            return Ok(false);
        };
        match update {
            RepositoryUpdate::Visibility { private } => repo.private = *private,
            RepositoryUpdate::Rename { name, full_name } => {
                repo.name = name.clone();
                repo.full_name = full_name.clone();
            }
            RepositoryUpdate::Archived(archived) => repo.archived = *archived,
        }
        Ok(true)
    }

    async fn touch_repository(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(repo) = write(&self.repositories)?.get_mut(id) {
            repo.last_activity_at = Some(at);
        }
        Ok(())
    }

    async fn find_commit(&self, repository_id: &str, sha: &str) -> Result<Option<Commit>> {
        Ok(read(&self.commits)?
            .get(&key(repository_id, sha))
            .map(|(_, c)| c.clone()))
    }

    async fn insert_commit(&self, commit: &Commit) -> Result<bool> {
        let mut commits = write(&self.commits)?;
        let k = key(&commit.repository_id, &commit.sha);
        if commits.contains_key(&k) {
            return Ok(false);
        }
        let seq = commits.len() as u64;
        commits.insert(k, (seq, commit.clone()));
        Ok(true)
    }

    async fn list_commits(&self, repository_id: &str) -> Result<Vec<Commit>> {
        let commits = read(&self.commits)?;
        let mut found: Vec<_> = commits
            .iter()
            .filter(|((repo, _), _)| repo == repository_id)
            .map(|(_, entry)| entry.clone())
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found.into_iter().map(|(_, c)| c).collect())
    }

    async fn upsert_file(&self, file: &FileRecord) -> Result<Option<FileRecord>> {
        Ok(write(&self.files)?.insert(key(&file.repository_id, &file.path), file.clone()))
    }

    async fn delete_file(&self, repository_id: &str, path: &str) -> Result<Option<FileRecord>> {
        Ok(write(&self.files)?.remove(&key(repository_id, path)))
    }

    async fn get_file(&self, repository_id: &str, path: &str) -> Result<Option<FileRecord>> {
        Ok(read(&self.files)?.get(&key(repository_id, path)).cloned())
    }

    async fn list_files(&self, repository_id: &str) -> Result<Vec<FileRecord>> {
        Ok(read(&self.files)?
            .iter()
            .filter(|((repo, _), _)| repo == repository_id)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn count_blob_references(&self, blob_reference: &str) -> Result<usize> {
        Ok(read(&self.files)?
            .values()
            .filter(|f| f.blob_reference == blob_reference)
            .count())
    }
}
