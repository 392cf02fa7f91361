//! Commit ingestion for push jobs.
//!
//! Walks the commits of a push in payload order. A commit already recorded
//! for the repository is skipped whole, which is what makes a replayed
//! delivery harmless. A new commit is recorded first and then each of its
//! paths is handed to the [`FilePipeline`]: added and modified paths, then
//! removed paths.
//!
//! After every commit has been attempted, the repository's last-activity
//! timestamp is touched once.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use repo_mirror_core::event::{CommitEntry, PushPayload};
use repo_mirror_core::models::Commit;
use repo_mirror_core::store::Store;

use crate::error::MirrorError;
use crate::pipeline::{FileContext, FileOutcome, FilePipeline};

#[derive(Debug)]
pub enum CommitStatus {
    Ingested,
    /// Already recorded; no file stages ran.
    Duplicate,
    Failed(MirrorError),
}

#[derive(Debug)]
pub struct FileReport {
    pub path: String,
    pub outcome: FileOutcome,
}

#[derive(Debug)]
pub struct CommitReport {
    pub sha: String,
    pub status: CommitStatus,
    pub files: Vec<FileReport>,
}

impl CommitReport {
    pub fn failed_files(&self) -> usize {
        self.files.iter().filter(|f| f.outcome.is_failure()).count()
    }
}

#[derive(Debug, Default)]
pub struct PushReport {
    pub commits: Vec<CommitReport>,
}

impl PushReport {
    pub fn ingested(&self) -> usize {
        self.count(|s| matches!(s, CommitStatus::Ingested))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|s| matches!(s, CommitStatus::Duplicate))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, CommitStatus::Failed(_)))
    }

    pub fn failed_files(&self) -> usize {
        self.commits.iter().map(CommitReport::failed_files).sum()
    }

    fn count(&self, pred: impl Fn(&CommitStatus) -> bool) -> usize {
        self.commits.iter().filter(|c| pred(&c.status)).count()
    }
}

pub struct CommitIngestor {
    store: Arc<dyn Store>,
    pipeline: FilePipeline,
}

impl CommitIngestor {
    pub fn new(store: Arc<dyn Store>, pipeline: FilePipeline) -> Self {
        Self { store, pipeline }
    }

    #[instrument(skip_all, fields(
        repository_id = %repository_id,
        git_ref = push.git_ref.as_deref().unwrap_or("-"),
        commits = push.commits.len(),
    ))]
    pub async fn ingest_push(&self, repository_id: &str, push: &PushPayload) -> PushReport {
        let snapshot = push.repository.to_repository();
        if let Err(e) = self.store.ensure_repository(&snapshot).await {
            warn!("could not record repository: {:#}", e);
        }

        let mut report = PushReport::default();
        for entry in &push.commits {
            let commit = self
                .ingest_commit(repository_id, &push.repository.full_name, entry)
                .await;
            report.commits.push(commit);
        }

        if let Err(e) = self.store.touch_repository(repository_id, Utc::now()).await {
            warn!("could not update last activity: {:#}", e);
        }

        info!(
            ingested = report.ingested(),
            duplicates = report.duplicates(),
            failed = report.failed(),
            failed_files = report.failed_files(),
            "push processed"
        );
        report
    }

    #[instrument(skip_all, fields(sha = %entry.id))]
    async fn ingest_commit(
        &self,
        repository_id: &str,
        full_name: &str,
        entry: &CommitEntry,
    ) -> CommitReport {
        let mut report = CommitReport {
            sha: entry.id.clone(),
            status: CommitStatus::Ingested,
            files: Vec::new(),
        };

        match self.record_commit(repository_id, entry).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("commit already ingested, skipping");
                report.status = CommitStatus::Duplicate;
                return report;
            }
            Err(e) => {
                warn!("commit not recorded: {}", e);
                report.status = CommitStatus::Failed(e);
                return report;
            }
        }

        let ctx = FileContext {
            repository_id,
            full_name,
            sha: &entry.id,
        };

        for path in entry.changed_paths() {
            let outcome = self.pipeline.process_changed(ctx, path).await;
            report.files.push(FileReport {
                path: path.to_string(),
                outcome,
            });
        }
        for path in &entry.removed {
            let outcome = self.pipeline.process_removed(ctx, path).await;
            report.files.push(FileReport {
                path: path.clone(),
                outcome,
            });
        }

        debug!(
            files = report.files.len(),
            failed_files = report.failed_files(),
            "commit ingested"
        );
        report
    }

    /// Record the commit. `Ok(false)` means it was already there.
    async fn record_commit(&self, repository_id: &str, entry: &CommitEntry) -> Result<bool, MirrorError> {
        if self
            .store
            .find_commit(repository_id, &entry.id)
            .await
            .map_err(MirrorError::database)?
            .is_some()
        {
            return Ok(false);
        }

        let commit = Commit {
            repository_id: repository_id.to_string(),
            sha: entry.id.clone(),
            message: entry.message.clone(),
            author_name: entry.author.name.clone(),
            author_email: entry.author.email.clone(),
            timestamp: entry.timestamp,
            source_url: entry.url.clone(),
            files_changed_count: entry.files_changed_count() as i64,
        };

        // Insert-or-ignore: a concurrent duplicate also lands here as `false`
        self.store
            .insert_commit(&commit)
            .await
            .map_err(MirrorError::database)
    }
}
