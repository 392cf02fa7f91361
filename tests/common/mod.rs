#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use repo_mirror::blob::{BlobStore, MemoryBlobStore};
use repo_mirror::config::PipelineConfig;
use repo_mirror::dispatch::{Dispatcher, Services};
use repo_mirror::embedding::{EmbeddingRequest, EmbeddingService};
use repo_mirror::error::{MirrorError, Service};
use repo_mirror::source_host::SourceHost;
use repo_mirror_core::event::{classify, WebhookJob};
use repo_mirror_core::models::{Commit, FileRecord, Repository, RepositoryUpdate};
use repo_mirror_core::store::Store;

/// Source host serving fixed content per `(path, sha)`.
#[derive(Default)]
pub struct FakeHost {
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    pub fetches: Mutex<Vec<(String, String)>>,
    gate: Option<Notify>,
    gated: Mutex<bool>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first fetch blocks until [`FakeHost::release`] is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            gated: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.notify_one();
        }
    }

    pub fn with(self, path: &str, sha: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert((path.to_string(), sha.to_string()), content.as_bytes().to_vec());
        self
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn fetch_file(&self, _repo: &str, path: &str, sha: &str) -> Result<Vec<u8>, MirrorError> {
        let wait = std::mem::replace(&mut *self.gated.lock().unwrap(), false);
        if wait {
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
        }

        self.fetches
            .lock()
            .unwrap()
            .push((path.to_string(), sha.to_string()));
        self.files
            .lock()
            .unwrap()
            .get(&(path.to_string(), sha.to_string()))
            .cloned()
            .ok_or_else(|| MirrorError::NotFound(format!("{}@{}", path, sha)))
    }
}

/// Memory blob store whose `put` fails for content containing a marker.
pub struct FlakyBlobs {
    pub inner: MemoryBlobStore,
    marker: &'static str,
}

impl FlakyBlobs {
    pub fn failing_on(marker: &'static str) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            marker,
        }
    }
}

#[async_trait]
impl BlobStore for FlakyBlobs {
    async fn put(&self, content: &[u8]) -> Result<String, MirrorError> {
        if String::from_utf8_lossy(content).contains(self.marker) {
            return Err(MirrorError::transient(Service::BlobStore, "HTTP 503"));
        }
        self.inner.put(content).await
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>, MirrorError> {
        self.inner.get(reference).await
    }

    async fn delete(&self, reference: &str) -> Result<(), MirrorError> {
        self.inner.delete(reference).await
    }
}

#[derive(Default)]
pub struct RecordingEmbeddings {
    pub submitted: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
}

#[async_trait]
impl EmbeddingService for RecordingEmbeddings {
    async fn submit(&self, request: &EmbeddingRequest) -> Result<(), MirrorError> {
        self.submitted.lock().unwrap().push(request.path.clone());
        Ok(())
    }

    async fn remove(&self, _repository_id: &str, path: &str) -> Result<(), MirrorError> {
        self.removed.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

/// Embedding service whose `submit` fails for one path.
pub struct FailingEmbeddings {
    failing_path: &'static str,
    pub submitted: Mutex<Vec<String>>,
}

impl FailingEmbeddings {
    pub fn failing_on(path: &'static str) -> Self {
        Self {
            failing_path: path,
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EmbeddingService for FailingEmbeddings {
    async fn submit(&self, request: &EmbeddingRequest) -> Result<(), MirrorError> {
        if request.path == self.failing_path {
            return Err(MirrorError::transient(Service::Embedding, "HTTP 500"));
        }
        self.submitted.lock().unwrap().push(request.path.clone());
        Ok(())
    }

    async fn remove(&self, _repository_id: &str, _path: &str) -> Result<(), MirrorError> {
        Ok(())
    }
}

/// Store wrapper that logs the order file records are written in, and can
/// refuse to upsert one path.
pub struct RecordingStore<S> {
    pub inner: S,
    pub writes: Mutex<Vec<String>>,
    failing_upsert: Option<&'static str>,
}

impl<S> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
            failing_upsert: None,
        }
    }

    pub fn failing_upsert(mut self, path: &'static str) -> Self {
        self.failing_upsert = Some(path);
        self
    }
}

#[async_trait]
impl<S: Store> Store for RecordingStore<S> {
    async fn ensure_repository(&self, repo: &Repository) -> anyhow::Result<bool> {
        self.inner.ensure_repository(repo).await
    }
    async fn get_repository(&self, id: &str) -> anyhow::Result<Option<Repository>> {
        self.inner.get_repository(id).await
    }
    async fn update_repository(&self, id: &str, update: &RepositoryUpdate) -> anyhow::Result<bool> {
        self.inner.update_repository(id, update).await
    }
    async fn touch_repository(&self, id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.inner.touch_repository(id, at).await
    }
    async fn find_commit(&self, repository_id: &str, sha: &str) -> anyhow::Result<Option<Commit>> {
        self.inner.find_commit(repository_id, sha).await
    }
    async fn insert_commit(&self, commit: &Commit) -> anyhow::Result<bool> {
        self.inner.insert_commit(commit).await
    }
    async fn list_commits(&self, repository_id: &str) -> anyhow::Result<Vec<Commit>> {
        self.inner.list_commits(repository_id).await
    }
    async fn upsert_file(&self, file: &FileRecord) -> anyhow::Result<Option<FileRecord>> {
        self.writes
            .lock()
            .unwrap()
            .push(format!("{}@{}", file.path, file.commit_sha));
        if self.failing_upsert == Some(file.path.as_str()) {
            anyhow::bail!("database is locked");
        }
        self.inner.upsert_file(file).await
    }
    async fn delete_file(&self, repository_id: &str, path: &str) -> anyhow::Result<Option<FileRecord>> {
        self.writes.lock().unwrap().push(format!("-{}", path));
        self.inner.delete_file(repository_id, path).await
    }
    async fn get_file(&self, repository_id: &str, path: &str) -> anyhow::Result<Option<FileRecord>> {
        self.inner.get_file(repository_id, path).await
    }
    async fn list_files(&self, repository_id: &str) -> anyhow::Result<Vec<FileRecord>> {
        self.inner.list_files(repository_id).await
    }
    async fn count_blob_references(&self, blob_reference: &str) -> anyhow::Result<usize> {
        self.inner.count_blob_references(blob_reference).await
    }
}

pub fn dispatcher(
    store: Arc<dyn Store>,
    host: Arc<dyn SourceHost>,
    blobs: Arc<dyn BlobStore>,
    embeddings: Arc<dyn EmbeddingService>,
) -> Dispatcher {
    dispatcher_with(&PipelineConfig::default(), store, host, blobs, embeddings)
}

pub fn dispatcher_with(
    config: &PipelineConfig,
    store: Arc<dyn Store>,
    host: Arc<dyn SourceHost>,
    blobs: Arc<dyn BlobStore>,
    embeddings: Arc<dyn EmbeddingService>,
) -> Dispatcher {
    let services = Services {
        store,
        source_host: host,
        blobs,
        embeddings,
    };
    Dispatcher::new(services, config).unwrap()
}

/// One commit of a push body: `(sha, added, modified, removed)`.
pub type CommitSpec<'a> = (&'a str, &'a [&'a str], &'a [&'a str], &'a [&'a str]);

pub fn push_body(commits: &[CommitSpec<'_>]) -> String {
    let commits: Vec<_> = commits
        .iter()
        .enumerate()
        .map(|(i, (sha, added, modified, removed))| {
            serde_json::json!({
                "id": sha,
                "message": format!("commit {}", i + 1),
                "author": { "name": "Ada Lovelace", "email": "ada@example.com" },
                "timestamp": format!("2024-05-01T10:0{}:00Z", i),
                "url": format!("https://github.com/acme/widgets/commit/{}", sha),
                "added": added,
                "modified": modified,
                "removed": removed,
            })
        })
        .collect();

    serde_json::json!({
        "ref": "refs/heads/main",
        "commits": commits,
        "repository": { "id": 42, "name": "widgets", "full_name": "acme/widgets" }
    })
    .to_string()
}

pub fn push_job(commits: &[CommitSpec<'_>]) -> WebhookJob {
    classify("push", push_body(commits).as_bytes())
        .unwrap()
        .unwrap()
}
