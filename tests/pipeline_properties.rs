mod common;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use repo_mirror::blob::{BlobStore, MemoryBlobStore};
use repo_mirror::config::{PipelineConfig, QueueConfig};
use repo_mirror::db;
use repo_mirror::dispatch::JobOutcome;
use repo_mirror::embedding::DisabledEmbeddingService;
use repo_mirror::ingest::CommitStatus;
use repo_mirror::migrate;
use repo_mirror::pipeline::{FileOutcome, Stage};
use repo_mirror::queue::{JobQueue, JobSink};
use repo_mirror::sqlite_store::SqliteStore;
use repo_mirror_core::store::memory::InMemoryStore;
use repo_mirror_core::store::Store;

use common::*;

async fn sqlite_store() -> (Arc<dyn Store>, TempDir) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("mirror.sqlite")).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (Arc::new(SqliteStore::new(pool)), tmp)
}

fn scenario_one_host() -> FakeHost {
    FakeHost::new()
        .with("a.py", "c1", "print('v1')\n")
        .with("b.md", "c1", "# notes\n")
        .with("a.py", "c2", "print('v2')\n")
}

const SCENARIO_ONE: &[CommitSpec<'static>] = &[
    ("c1", &["a.py", "b.md"], &[], &[]),
    ("c2", &[], &["a.py"], &["b.md"]),
];

async fn run_scenario_one(store: Arc<dyn Store>) {
    let blobs = Arc::new(MemoryBlobStore::new());
    let embeddings = Arc::new(RecordingEmbeddings::default());
    let d = dispatcher(
        store.clone(),
        Arc::new(scenario_one_host()),
        blobs.clone(),
        embeddings.clone(),
    );

    let JobOutcome::Push(report) = d.dispatch(&push_job(SCENARIO_ONE)).await else {
        panic!("expected push outcome");
    };
    assert_eq!(report.ingested(), 2);
    assert_eq!(report.failed_files(), 0);

    let files = store.list_files("42").await.unwrap();
    assert_eq!(files.len(), 1);
    let a = &files[0];
    assert_eq!(a.path, "a.py");
    assert_eq!(a.commit_sha, "c2");
    assert_eq!(blobs.get(&a.blob_reference).await.unwrap(), b"print('v2')\n");

    let commits = store.list_commits("42").await.unwrap();
    let shas: Vec<_> = commits.iter().map(|c| c.sha.as_str()).collect();
    assert_eq!(shas, vec!["c1", "c2"]);
    assert_eq!(commits[1].files_changed_count, 2);

    // Only a.py@c2 remains referenced
    assert_eq!(blobs.len(), 1);
    assert_eq!(*embeddings.removed.lock().unwrap(), vec!["b.md"]);

    // Replay: nothing changes
    let JobOutcome::Push(replay) = d.dispatch(&push_job(SCENARIO_ONE)).await else {
        panic!("expected push outcome");
    };
    assert_eq!(replay.duplicates(), 2);
    assert_eq!(store.list_commits("42").await.unwrap(), commits);
    assert_eq!(store.list_files("42").await.unwrap(), files);
    assert_eq!(blobs.len(), 1);
}

#[tokio::test]
async fn scenario_one_and_replay_in_memory() {
    run_scenario_one(Arc::new(InMemoryStore::default())).await;
}

#[tokio::test]
async fn scenario_one_and_replay_sqlite() {
    let (store, _tmp) = sqlite_store().await;
    run_scenario_one(store).await;
}

#[tokio::test]
async fn not_found_path_is_skipped_and_commit_recorded() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
    let host = FakeHost::new().with("present.rs", "c1", "fn main() {}\n");
    let d = dispatcher(
        store.clone(),
        Arc::new(host),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(DisabledEmbeddingService),
    );

    let job = push_job(&[("c1", &["missing.rs", "present.rs"], &[], &[])]);
    let JobOutcome::Push(report) = d.dispatch(&job).await else {
        panic!("expected push outcome");
    };

    let commit = &report.commits[0];
    assert!(matches!(commit.status, CommitStatus::Ingested));
    assert!(matches!(commit.files[0].outcome, FileOutcome::Skipped(_)));
    assert!(matches!(commit.files[1].outcome, FileOutcome::Stored));

    assert!(store.get_file("42", "missing.rs").await.unwrap().is_none());
    assert!(store.get_file("42", "present.rs").await.unwrap().is_some());
    assert!(store.find_commit("42", "c1").await.unwrap().is_some());
}

#[tokio::test]
async fn commits_apply_in_payload_order() {
    let store = Arc::new(RecordingStore::new(InMemoryStore::default()));
    let host = FakeHost::new()
        .with("a/one.rs", "A", "1")
        .with("a/two.rs", "A", "2")
        .with("b/three.rs", "B", "3");
    let d = dispatcher(
        store.clone(),
        Arc::new(host),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(DisabledEmbeddingService),
    );

    d.dispatch(&push_job(&[
        ("A", &["a/one.rs"], &["a/two.rs"], &[]),
        ("B", &["b/three.rs"], &[], &["a/gone.rs"]),
    ]))
    .await;

    assert_eq!(
        *store.writes.lock().unwrap(),
        vec!["a/one.rs@A", "a/two.rs@A", "b/three.rs@B", "-a/gone.rs"]
    );
}

#[tokio::test]
async fn store_failure_does_not_stop_siblings() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
    let host = FakeHost::new()
        .with("x.txt", "c1", "FAIL_STORE")
        .with("y.txt", "c1", "fine")
        .with("z.txt", "c2", "also fine");
    let d = dispatcher(
        store.clone(),
        Arc::new(host),
        Arc::new(FlakyBlobs::failing_on("FAIL_STORE")),
        Arc::new(DisabledEmbeddingService),
    );

    let JobOutcome::Push(report) = d
        .dispatch(&push_job(&[
            ("c1", &["x.txt", "y.txt"], &[], &[]),
            ("c2", &["z.txt"], &[], &[]),
        ]))
        .await
    else {
        panic!("expected push outcome");
    };

    assert!(matches!(
        report.commits[0].files[0].outcome,
        FileOutcome::Failed {
            stage: Stage::Store,
            ..
        }
    ));
    assert_eq!(report.failed_files(), 1);
    assert!(store.get_file("42", "x.txt").await.unwrap().is_none());
    assert!(store.get_file("42", "y.txt").await.unwrap().is_some());
    assert!(store.get_file("42", "z.txt").await.unwrap().is_some());

    let repo = store.get_repository("42").await.unwrap().unwrap();
    assert!(repo.last_activity_at.is_some());
}

#[tokio::test]
async fn removal_after_add_in_same_push_leaves_no_record() {
    let (store, _tmp) = sqlite_store().await;
    let blobs = Arc::new(MemoryBlobStore::new());
    let host = FakeHost::new().with("p.json", "c1", "{}");
    let d = dispatcher(
        store.clone(),
        Arc::new(host),
        blobs.clone(),
        Arc::new(DisabledEmbeddingService),
    );

    d.dispatch(&push_job(&[
        ("c1", &["p.json"], &[], &[]),
        ("c2", &[], &[], &["p.json"]),
    ]))
    .await;

    assert!(store.get_file("42", "p.json").await.unwrap().is_none());
    assert!(blobs.is_empty());
    assert_eq!(store.list_commits("42").await.unwrap().len(), 2);
}

#[tokio::test]
async fn oversized_modification_drops_stale_record() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
    let blobs = Arc::new(MemoryBlobStore::new());
    let embeddings = Arc::new(RecordingEmbeddings::default());
    let host = FakeHost::new()
        .with("a.py", "c1", "pass\n")
        .with("a.py", "c2", "def main():\n    print('much longer now')\n");
    let config = PipelineConfig {
        max_file_bytes: 10,
        ..PipelineConfig::default()
    };
    let d = dispatcher_with(
        &config,
        store.clone(),
        Arc::new(host),
        blobs.clone(),
        embeddings.clone(),
    );

    let JobOutcome::Push(report) = d
        .dispatch(&push_job(&[("c1", &["a.py"], &[], &[]), ("c2", &[], &["a.py"], &[])]))
        .await
    else {
        panic!("expected push outcome");
    };

    assert!(matches!(report.commits[0].files[0].outcome, FileOutcome::Indexed));
    assert!(matches!(report.commits[1].files[0].outcome, FileOutcome::Skipped(_)));
    assert!(store.get_file("42", "a.py").await.unwrap().is_none());
    assert!(blobs.is_empty());
    assert_eq!(*embeddings.removed.lock().unwrap(), vec!["a.py"]);
}

#[tokio::test]
async fn path_that_stops_being_a_file_drops_stale_record() {
    let (store, _tmp) = sqlite_store().await;
    let blobs = Arc::new(MemoryBlobStore::new());
    // At c2 "vendor/lib" became a submodule; the host has no file there
    let host = FakeHost::new()
        .with("vendor/lib", "c1", "placeholder")
        .with("README.md", "c2", "# widgets\n");
    let d = dispatcher(
        store.clone(),
        Arc::new(host),
        blobs.clone(),
        Arc::new(DisabledEmbeddingService),
    );

    d.dispatch(&push_job(&[
        ("c1", &["vendor/lib"], &[], &[]),
        ("c2", &["README.md"], &["vendor/lib"], &[]),
    ]))
    .await;

    assert!(store.get_file("42", "vendor/lib").await.unwrap().is_none());
    let files = store.list_files("42").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "README.md");
    assert_eq!(blobs.len(), 1);
}

#[tokio::test]
async fn index_failure_keeps_record_and_siblings() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
    let embeddings = Arc::new(FailingEmbeddings::failing_on("x.md"));
    let host = FakeHost::new()
        .with("x.md", "c1", "# x\n")
        .with("y.md", "c1", "# y\n");
    let d = dispatcher(
        store.clone(),
        Arc::new(host),
        Arc::new(MemoryBlobStore::new()),
        embeddings.clone(),
    );

    let JobOutcome::Push(report) = d.dispatch(&push_job(&[("c1", &["x.md", "y.md"], &[], &[])])).await
    else {
        panic!("expected push outcome");
    };

    let files = &report.commits[0].files;
    assert!(matches!(files[0].outcome, FileOutcome::Stored));
    assert!(matches!(files[1].outcome, FileOutcome::Indexed));
    assert_eq!(report.failed_files(), 0);

    let x = store.get_file("42", "x.md").await.unwrap().unwrap();
    assert_eq!(x.commit_sha, "c1");
    assert!(store.get_file("42", "y.md").await.unwrap().is_some());
    assert_eq!(*embeddings.submitted.lock().unwrap(), vec!["y.md"]);
}

#[tokio::test]
async fn metadata_failure_releases_new_blob() {
    let store = Arc::new(RecordingStore::new(InMemoryStore::default()).failing_upsert("x.txt"));
    let blobs = Arc::new(MemoryBlobStore::new());
    let host = FakeHost::new()
        .with("x.txt", "c1", "only x has this")
        .with("y.txt", "c1", "y content");
    let d = dispatcher(
        store.clone(),
        Arc::new(host),
        blobs.clone(),
        Arc::new(DisabledEmbeddingService),
    );

    let JobOutcome::Push(report) = d.dispatch(&push_job(&[("c1", &["x.txt", "y.txt"], &[], &[])])).await
    else {
        panic!("expected push outcome");
    };

    assert!(matches!(
        report.commits[0].files[0].outcome,
        FileOutcome::Failed {
            stage: Stage::Metadata,
            ..
        }
    ));
    assert!(store.get_file("42", "x.txt").await.unwrap().is_none());
    let y = store.get_file("42", "y.txt").await.unwrap().unwrap();
    assert_eq!(blobs.len(), 1);
    assert!(blobs.contains(&y.blob_reference));
}

#[tokio::test]
async fn queue_drains_jobs_in_enqueue_order() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
    let mut host = FakeHost::gated();
    for i in 0..5 {
        host = host.with(&format!("f{}.rs", i), &format!("s{}", i), "x");
    }
    let host = Arc::new(host);
    let d = Arc::new(dispatcher(
        store.clone(),
        host.clone(),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(DisabledEmbeddingService),
    ));

    let config = QueueConfig {
        capacity: 8,
        pause_ms: 1,
    };
    let (queue, worker) = JobQueue::start(d, &config);

    for i in 0..5 {
        let sha = format!("s{}", i);
        let path = format!("f{}.rs", i);
        queue
            .enqueue(push_job(&[(sha.as_str(), &[path.as_str()], &[], &[])]))
            .await
            .unwrap();
    }
    // First job is blocked on the gate; everything else is waiting
    assert_eq!(queue.stats().enqueued, 5);
    host.release();

    while queue.stats().consumed < 5 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(queue.stats().pending, 0);
    drop(queue);
    worker.join().await.unwrap();

    let shas: Vec<_> = store
        .list_commits("42")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.sha)
        .collect();
    assert_eq!(shas, vec!["s0", "s1", "s2", "s3", "s4"]);
    let fetched: Vec<_> = host
        .fetches
        .lock()
        .unwrap()
        .iter()
        .map(|(_, sha)| sha.clone())
        .collect();
    assert_eq!(fetched, vec!["s0", "s1", "s2", "s3", "s4"]);
}
