//! Per-file change pipeline.
//!
//! Every path a commit touches goes through a fixed sequence of stages.
//! Changed (added or modified) paths:
//!
//! ```text
//! Fetch ──► Store ──► Metadata ──► Index
//!  │          │          │           │
//!  │          │          │           └─ failure logged, file still Stored
//!  │          │          └─ upsert FileRecord, drop the replaced blob if orphaned
//!  │          └─ content-addressed blob put
//!  └─ NotFound / non-file entry ─► Skipped
//! ```
//!
//! Removed paths run a single Delete stage, then best-effort blob and
//! embedding cleanup. A changed path that is skipped for being too large or
//! no longer a file gets the same cleanup, so no record outlives the commit
//! that last touched its path.
//!
//! Each stage returns `Result<_, MirrorError>`; the pipeline folds the result
//! into a [`FileOutcome`] instead of propagating it, so one file can never
//! stop its siblings.

use anyhow::Result;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use tracing::{debug, warn};

use repo_mirror_core::filetype::classify_path;
use repo_mirror_core::models::{file_name, FileRecord};

use crate::config::PipelineConfig;
use crate::dispatch::Services;
use crate::embedding::EmbeddingRequest;
use crate::error::MirrorError;

/// Pipeline stage, reported alongside a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Store,
    Metadata,
    Index,
    Delete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Store => "store",
            Stage::Metadata => "metadata",
            Stage::Index => "index",
            Stage::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// What happened to one path.
#[derive(Debug)]
pub enum FileOutcome {
    /// Stored, recorded and submitted for indexing.
    Indexed,
    /// Stored and recorded; indexing skipped or failed.
    Stored,
    Removed,
    Skipped(String),
    Failed { stage: Stage, error: MirrorError },
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

/// The commit a path is processed for.
#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    pub repository_id: &'a str,
    /// `owner/name`, used to address the source host.
    pub full_name: &'a str,
    pub sha: &'a str,
}

pub struct FilePipeline {
    services: Services,
    excludes: GlobSet,
    max_file_bytes: u64,
}

impl FilePipeline {
    pub fn new(services: Services, config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            services,
            excludes: build_globset(&config.exclude_globs)?,
            max_file_bytes: config.max_file_bytes,
        })
    }

    /// Run fetch → store → metadata → index for an added or modified path.
    pub async fn process_changed(&self, ctx: FileContext<'_>, path: &str) -> FileOutcome {
        if self.excludes.is_match(path) {
            debug!(path, "excluded by pipeline.exclude_globs");
            return FileOutcome::Skipped("excluded".to_string());
        }

        let content = match self
            .services
            .source_host
            .fetch_file(ctx.full_name, path, ctx.sha)
            .await
        {
            Ok(content) => content,
            Err(e) if e.is_expected() => {
                debug!(path, sha = ctx.sha, "{}", e);
                return self
                    .skip_changed(ctx, path, "not a file at this commit".to_string())
                    .await;
            }
            Err(e) => return failed(Stage::Fetch, path, e),
        };

        if content.len() as u64 > self.max_file_bytes {
            debug!(path, size = content.len(), "exceeds pipeline.max_file_bytes");
            let reason = format!("{} bytes exceeds size limit", content.len());
            return self.skip_changed(ctx, path, reason).await;
        }

        let blob_reference = match self.services.blobs.put(&content).await {
            Ok(r) => r,
            Err(e) => return failed(Stage::Store, path, e),
        };

        let file_type = classify_path(path);
        let record = FileRecord {
            repository_id: ctx.repository_id.to_string(),
            path: path.to_string(),
            name: file_name(path).to_string(),
            kind: file_type.kind,
            size: content.len() as i64,
            language: file_type.language.map(str::to_string),
            blob_reference,
            commit_sha: ctx.sha.to_string(),
            updated_at: Utc::now(),
        };

        match self.services.store.upsert_file(&record).await {
            Ok(Some(previous)) if previous.blob_reference != record.blob_reference => {
                self.release_blob(&previous.blob_reference).await;
            }
            Ok(_) => {}
            Err(e) => {
                self.release_blob(&record.blob_reference).await;
                return failed(Stage::Metadata, path, MirrorError::database(e));
            }
        }

        self.index(&record, content).await
    }

    /// Delete the record for a removed path and clean up after it.
    pub async fn process_removed(&self, ctx: FileContext<'_>, path: &str) -> FileOutcome {
        match self.discard(ctx, path).await {
            Ok(Some(_)) => FileOutcome::Removed,
            Ok(None) => {
                debug!(path, "removed path had no record");
                FileOutcome::Skipped("no record".to_string())
            }
            Err(e) => failed(Stage::Delete, path, e),
        }
    }

    /// A changed path that will not be stored loses whatever an earlier
    /// commit recorded for it.
    async fn skip_changed(&self, ctx: FileContext<'_>, path: &str, reason: String) -> FileOutcome {
        match self.discard(ctx, path).await {
            Ok(Some(stale)) => {
                debug!(path, previous_sha = %stale.commit_sha, "dropped stale record");
                FileOutcome::Skipped(reason)
            }
            Ok(None) => FileOutcome::Skipped(reason),
            Err(e) => failed(Stage::Delete, path, e),
        }
    }

    /// Delete the record for `path`, then release its blob and derived
    /// vectors. Only the record deletion can fail.
    async fn discard(
        &self,
        ctx: FileContext<'_>,
        path: &str,
    ) -> Result<Option<FileRecord>, MirrorError> {
        let removed = self
            .services
            .store
            .delete_file(ctx.repository_id, path)
            .await
            .map_err(MirrorError::database)?;

        if let Some(ref record) = removed {
            self.release_blob(&record.blob_reference).await;
        }

        if self.services.embeddings.is_enabled() {
            if let Err(e) = self
                .services
                .embeddings
                .remove(ctx.repository_id, path)
                .await
            {
                warn!(path, stage = %Stage::Delete, "embedding removal failed: {}", e);
            }
        }

        Ok(removed)
    }

    async fn index(&self, record: &FileRecord, content: Vec<u8>) -> FileOutcome {
        let embeddings = &self.services.embeddings;
        if !embeddings.is_enabled() {
            return FileOutcome::Stored;
        }

        let content = match String::from_utf8(content) {
            Ok(text) => text,
            Err(_) => {
                debug!(path = %record.path, "binary content, not indexed");
                return FileOutcome::Stored;
            }
        };

        let request = EmbeddingRequest {
            repository_id: record.repository_id.clone(),
            path: record.path.clone(),
            content,
            metadata: serde_json::json!({
                "name": record.name,
                "kind": record.kind,
                "language": record.language,
                "size": record.size,
                "commit_sha": record.commit_sha,
                "blob_reference": record.blob_reference,
            }),
        };

        match embeddings.submit(&request).await {
            Ok(()) => FileOutcome::Indexed,
            Err(e) => {
                warn!(path = %record.path, stage = %Stage::Index, "{}", e);
                FileOutcome::Stored
            }
        }
    }

    /// Delete a blob once no record points at it. Failures are only logged.
    async fn release_blob(&self, blob_reference: &str) {
        match self
            .services
            .store
            .count_blob_references(blob_reference)
            .await
        {
            Ok(0) => {
                if let Err(e) = self.services.blobs.delete(blob_reference).await {
                    warn!(blob_reference, "blob cleanup failed: {}", e);
                }
            }
            Ok(n) => debug!(blob_reference, references = n, "blob still referenced"),
            Err(e) => warn!(blob_reference, "blob reference count failed: {:#}", e),
        }
    }
}

fn failed(stage: Stage, path: &str, error: MirrorError) -> FileOutcome {
    warn!(path, stage = %stage, "{}", error);
    FileOutcome::Failed { stage, error }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
