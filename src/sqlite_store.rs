//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the `repositories`, `commits` and
//! `files` tables created by [`crate::migrate`]. Timestamps are stored as
//! Unix epoch seconds.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use repo_mirror_core::models::{Commit, FileRecord, Repository, RepositoryUpdate};
use repo_mirror_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn repository_from_row(row: &SqliteRow) -> Repository {
    Repository {
        id: row.get("id"),
        name: row.get("name"),
        full_name: row.get("full_name"),
        private: row.get("private"),
        archived: row.get("archived"),
        default_branch: row.get("default_branch"),
        last_activity_at: row
            .get::<Option<i64>, _>("last_activity_at")
            .map(from_ts),
    }
}

fn commit_from_row(row: &SqliteRow) -> Commit {
    Commit {
        repository_id: row.get("repository_id"),
        sha: row.get("sha"),
        message: row.get("message"),
        author_name: row.get("author_name"),
        author_email: row.get("author_email"),
        timestamp: from_ts(row.get("timestamp")),
        source_url: row.get("source_url"),
        files_changed_count: row.get("files_changed_count"),
    }
}

fn file_from_row(row: &SqliteRow) -> Result<FileRecord> {
    let kind: String = row.get("kind");
    Ok(FileRecord {
        repository_id: row.get("repository_id"),
        path: row.get("path"),
        name: row.get("name"),
        kind: kind.parse()?,
        size: row.get("size"),
        language: row.get("language"),
        blob_reference: row.get("blob_reference"),
        commit_sha: row.get("commit_sha"),
        updated_at: from_ts(row.get("updated_at")),
    })
}

const FILE_COLUMNS: &str = "repository_id, path, name, kind, size, language, blob_reference, commit_sha, updated_at";

#[async_trait]
impl Store for SqliteStore {
    async fn ensure_repository(&self, repo: &Repository) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO repositories (id, name, full_name, private, archived, default_branch, last_activity_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&repo.id)
        .bind(&repo.name)
        .bind(&repo.full_name)
        .bind(repo.private)
        .bind(repo.archived)
        .bind(&repo.default_branch)
        .bind(repo.last_activity_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let row = sqlx::query("SELECT * FROM repositories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(repository_from_row))
    }

    async fn update_repository(&self, id: &str, update: &RepositoryUpdate) -> Result<bool> {
        let query = match update {
            RepositoryUpdate::Visibility { private } => {
                sqlx::query("UPDATE repositories SET private = ? WHERE id = ?").bind(*private)
            }
            RepositoryUpdate::Rename { name, full_name } => {
                sqlx::query("UPDATE repositories SET name = ?, full_name = ? WHERE id = ?")
                    .bind(name.clone())
                    .bind(full_name.clone())
            }
            RepositoryUpdate::Archived(archived) => {
                sqlx::query("UPDATE repositories SET archived = ? WHERE id = ?").bind(*archived)
            }
        };

        let result = query.bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_repository(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE repositories SET last_activity_at = ? WHERE id = ?")
            .bind(at.timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_commit(&self, repository_id: &str, sha: &str) -> Result<Option<Commit>> {
        let row = sqlx::query("SELECT * FROM commits WHERE repository_id = ? AND sha = ?")
            .bind(repository_id)
            .bind(sha)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(commit_from_row))
    }

    async fn insert_commit(&self, commit: &Commit) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO commits (repository_id, sha, message, author_name, author_email,
                                 timestamp, source_url, files_changed_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repository_id, sha) DO NOTHING
            "#,
        )
        .bind(&commit.repository_id)
        .bind(&commit.sha)
        .bind(&commit.message)
        .bind(&commit.author_name)
        .bind(&commit.author_email)
        .bind(commit.timestamp.timestamp())
        .bind(&commit.source_url)
        .bind(commit.files_changed_count)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_commits(&self, repository_id: &str) -> Result<Vec<Commit>> {
        let rows = sqlx::query("SELECT * FROM commits WHERE repository_id = ? ORDER BY seq")
            .bind(repository_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(commit_from_row).collect())
    }

    async fn upsert_file(&self, file: &FileRecord) -> Result<Option<FileRecord>> {
        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query(&format!(
            "SELECT {} FROM files WHERE repository_id = ? AND path = ?",
            FILE_COLUMNS
        ))
        .bind(&file.repository_id)
        .bind(&file.path)
        .fetch_optional(&mut *tx)
        .await?
        .as_ref()
        .map(file_from_row)
        .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO files (repository_id, path, name, kind, size, language,
                               blob_reference, commit_sha, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repository_id, path) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                size = excluded.size,
                language = excluded.language,
                blob_reference = excluded.blob_reference,
                commit_sha = excluded.commit_sha,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&file.repository_id)
        .bind(&file.path)
        .bind(&file.name)
        .bind(file.kind.as_str())
        .bind(file.size)
        .bind(&file.language)
        .bind(&file.blob_reference)
        .bind(&file.commit_sha)
        .bind(file.updated_at.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous)
    }

    async fn delete_file(&self, repository_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(&format!(
            "DELETE FROM files WHERE repository_id = ? AND path = ? RETURNING {}",
            FILE_COLUMNS
        ))
        .bind(repository_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn get_file(&self, repository_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM files WHERE repository_id = ? AND path = ?",
            FILE_COLUMNS
        ))
        .bind(repository_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn list_files(&self, repository_id: &str) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM files WHERE repository_id = ? ORDER BY path",
            FILE_COLUMNS
        ))
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(file_from_row).collect()
    }

    async fn count_blob_references(&self, blob_reference: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE blob_reference = ?")
            .bind(blob_reference)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
