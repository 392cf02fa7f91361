//! Job routing.
//!
//! The [`Dispatcher`] is what the queue worker calls for each job. It checks
//! that the job is internally consistent, then routes on the payload variant:
//! push jobs go to the [`CommitIngestor`], repository jobs to the
//! [`MetadataUpdater`]. Whatever happens, the job ends consumed; failures are
//! logged and returned in the [`JobOutcome`].

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use repo_mirror_core::event::{JobPayload, WebhookJob};
use repo_mirror_core::store::Store;

use crate::blob::BlobStore;
use crate::config::PipelineConfig;
use crate::embedding::EmbeddingService;
use crate::error::MirrorError;
use crate::ingest::{CommitIngestor, PushReport};
use crate::metadata::{MetadataOutcome, MetadataUpdater};
use crate::pipeline::FilePipeline;
use crate::queue::JobHandler;
use crate::source_host::SourceHost;

/// The external collaborators a job touches.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub source_host: Arc<dyn SourceHost>,
    pub blobs: Arc<dyn BlobStore>,
    pub embeddings: Arc<dyn EmbeddingService>,
}

#[derive(Debug)]
pub enum JobOutcome {
    Push(PushReport),
    Repository(MetadataOutcome),
    Failed(MirrorError),
}

pub struct Dispatcher {
    ingestor: CommitIngestor,
    metadata: MetadataUpdater,
}

impl Dispatcher {
    pub fn new(services: Services, pipeline: &PipelineConfig) -> Result<Self> {
        let store = services.store.clone();
        Ok(Self {
            ingestor: CommitIngestor::new(store.clone(), FilePipeline::new(services, pipeline)?),
            metadata: MetadataUpdater::new(store),
        })
    }

    #[instrument(skip_all, fields(job_id = %job.id, kind = %job.event_kind(), repository_id = %job.repository_id))]
    pub async fn dispatch(&self, job: &WebhookJob) -> JobOutcome {
        if let Err(e) = validate(job) {
            error!("rejecting job: {}", e);
            return JobOutcome::Failed(e);
        }

        match &job.payload {
            JobPayload::Push(push) => {
                JobOutcome::Push(self.ingestor.ingest_push(&job.repository_id, push).await)
            }
            JobPayload::RepositoryMeta(meta) => {
                match self.metadata.apply(&job.repository_id, meta).await {
                    Ok(outcome) => JobOutcome::Repository(outcome),
                    Err(e) => {
                        warn!("repository update failed: {}", e);
                        JobOutcome::Failed(e)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler for Dispatcher {
    async fn handle(&self, job: WebhookJob) {
        let outcome = self.dispatch(&job).await;
        info!(job_id = %job.id, failed = matches!(outcome, JobOutcome::Failed(_)), "job consumed");
    }
}

/// Semantic checks the payload types cannot express.
fn validate(job: &WebhookJob) -> Result<(), MirrorError> {
    let snapshot = job.payload.repository();
    if snapshot.id != job.repository_id {
        return Err(MirrorError::DataIntegrity(format!(
            "job for repository {} carries payload for repository {}",
            job.repository_id, snapshot.id
        )));
    }
    if snapshot.full_name.split('/').filter(|s| !s.is_empty()).count() != 2 {
        return Err(MirrorError::DataIntegrity(format!(
            "repository full_name '{}' is not owner/name",
            snapshot.full_name
        )));
    }

    if let JobPayload::Push(push) = &job.payload {
        if push.commits.iter().any(|c| c.id.trim().is_empty()) {
            return Err(MirrorError::DataIntegrity(
                "push contains a commit without an id".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::embedding::DisabledEmbeddingService;
    use repo_mirror_core::event::classify;
    use repo_mirror_core::store::memory::InMemoryStore;

    struct NoHost;

    #[async_trait]
    impl SourceHost for NoHost {
        async fn fetch_file(&self, _r: &str, path: &str, _s: &str) -> Result<Vec<u8>, MirrorError> {
            Err(MirrorError::NotFound(path.to_string()))
        }
    }

    fn dispatcher(store: Arc<InMemoryStore>) -> Dispatcher {
        let services = Services {
            store,
            source_host: Arc::new(NoHost),
            blobs: Arc::new(MemoryBlobStore::new()),
            embeddings: Arc::new(DisabledEmbeddingService),
        };
        Dispatcher::new(services, &PipelineConfig::default()).unwrap()
    }

    fn push_job(commit_id: &str) -> WebhookJob {
        let body = serde_json::json!({
            "commits": [{
                "id": commit_id,
                "message": "m",
                "author": { "name": "Ada" },
                "timestamp": "2024-05-01T10:00:00Z",
                "added": ["a.py"]
            }],
            "repository": { "id": 42, "name": "widgets", "full_name": "acme/widgets" }
        });
        classify("push", body.to_string().as_bytes()).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_routes_push() {
        let store = Arc::new(InMemoryStore::default());
        let outcome = dispatcher(store.clone()).dispatch(&push_job("c1")).await;
        let JobOutcome::Push(report) = outcome else {
            panic!("expected push outcome");
        };
        assert_eq!(report.ingested(), 1);
        // Content missing upstream: commit recorded, file skipped
        assert!(store.find_commit("42", "c1").await.unwrap().is_some());
        assert!(store.list_files("42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repository_mismatch_is_data_integrity() {
        let store = Arc::new(InMemoryStore::default());
        let mut job = push_job("c1");
        job.repository_id = "7".into();

        let outcome = dispatcher(store.clone()).dispatch(&job).await;
        assert!(matches!(
            outcome,
            JobOutcome::Failed(MirrorError::DataIntegrity(_))
        ));
        assert!(store.list_commits("42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_commit_id_rejected() {
        let store = Arc::new(InMemoryStore::default());
        let outcome = dispatcher(store).dispatch(&push_job(" ")).await;
        assert!(matches!(
            outcome,
            JobOutcome::Failed(MirrorError::DataIntegrity(_))
        ));
    }

    #[tokio::test]
    async fn test_routes_repository_meta() {
        let store = Arc::new(InMemoryStore::default());
        let body = br#"{"action":"privatized","repository":{"id":42,"name":"widgets","full_name":"acme/widgets"}}"#;
        let job = classify("repository", body).unwrap().unwrap();

        let outcome = dispatcher(store.clone()).dispatch(&job).await;
        assert!(matches!(outcome, JobOutcome::Repository(MetadataOutcome::Applied(_))));
        assert!(store.get_repository("42").await.unwrap().unwrap().private);
    }
}
