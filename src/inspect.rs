//! `mirror files` and `mirror commits`: read-only views of the mirror.

use anyhow::Result;

use repo_mirror_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

async fn open_store(config: &Config) -> Result<SqliteStore> {
    Ok(SqliteStore::new(db::open(config).await?))
}

pub async fn list_files(config: &Config, repository_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let files = store.list_files(repository_id).await?;

    if files.is_empty() {
        println!("No files recorded for repository {}.", repository_id);
        return Ok(());
    }

    println!(
        "{:<50} {:<14} {:<12} {:>10}  {}",
        "PATH", "KIND", "LANGUAGE", "SIZE", "COMMIT"
    );
    for f in &files {
        println!(
            "{:<50} {:<14} {:<12} {:>10}  {}",
            f.path,
            f.kind,
            f.language.as_deref().unwrap_or("-"),
            f.size,
            short_sha(&f.commit_sha)
        );
    }
    println!("\n{} files", files.len());
    Ok(())
}

pub async fn list_commits(config: &Config, repository_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let commits = store.list_commits(repository_id).await?;

    if let Some(repo) = store.get_repository(repository_id).await? {
        let last = repo
            .last_activity_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} ({}{}) last activity {}",
            repo.full_name,
            if repo.private { "private" } else { "public" },
            if repo.archived { ", archived" } else { "" },
            last
        );
    }

    for c in &commits {
        let subject = c.message.lines().next().unwrap_or_default();
        println!(
            "{}  {}  {:>3} files  {:<20} {}",
            short_sha(&c.sha),
            c.timestamp.format("%Y-%m-%d %H:%M"),
            c.files_changed_count,
            c.author_name,
            subject
        );
    }
    println!("\n{} commits", commits.len());
    Ok(())
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}
