use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database file and schema (`mirror init`).
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotently create all tables and indexes on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            full_name TEXT NOT NULL,
            private INTEGER NOT NULL DEFAULT 0,
            archived INTEGER NOT NULL DEFAULT 0,
            default_branch TEXT,
            last_activity_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // (repository_id, sha) is the idempotency key for replayed deliveries
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commits (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id TEXT NOT NULL,
            sha TEXT NOT NULL,
            message TEXT NOT NULL,
            author_name TEXT NOT NULL,
            author_email TEXT,
            timestamp INTEGER NOT NULL,
            source_url TEXT NOT NULL,
            files_changed_count INTEGER NOT NULL,
            UNIQUE(repository_id, sha)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            repository_id TEXT NOT NULL,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            size INTEGER NOT NULL,
            language TEXT,
            blob_reference TEXT NOT NULL,
            commit_sha TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (repository_id, path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_blob_reference ON files(blob_reference)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_commits_repository ON commits(repository_id, seq)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
