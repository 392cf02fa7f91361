//! In-memory FIFO job queue with a single worker.
//!
//! [`JobQueue`] is a bounded `tokio::sync::mpsc` channel drained by exactly
//! one task, so jobs run one at a time in enqueue order. Each job runs in
//! its own spawned task that the worker awaits before taking the next one;
//! a panicking job surfaces as a `JoinError`, is logged, and the loop moves
//! on. A fixed pause follows every job.
//!
//! Every enqueue returns a [`JobTicket`], a sequence number. Because the
//! drain is strictly FIFO, the worker's progress counters are enough to
//! answer [`JobState`] for any ticket.
//!
//! Nothing is persisted: jobs still queued when the process exits are lost.
//!
//! [`InlineQueue`] implements the same [`JobSink`] seam but runs the job on
//! the caller's task before `enqueue` returns. Concurrent callers take turns,
//! so it keeps the one-job-at-a-time guarantee. Router tests and embedders
//! that want synchronous processing use it.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use repo_mirror_core::event::WebhookJob;

use crate::config::QueueConfig;

/// Processes one job. Implemented by the dispatcher.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: WebhookJob);
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue is shut down")]
    Closed,
}

/// Sequence number assigned at enqueue, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobTicket(pub u64);

impl fmt::Display for JobTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Enqueued,
    Processing,
    Consumed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub consumed: u64,
    /// Waiting jobs, not counting the one being processed.
    pub pending: u64,
    pub processing: bool,
    pub panicked: u64,
}

/// Where jobs are handed off for processing.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn enqueue(&self, job: WebhookJob) -> Result<JobTicket, QueueError>;

    /// `None` for a ticket this queue never issued.
    fn state(&self, ticket: JobTicket) -> Option<JobState>;

    fn stats(&self) -> QueueStats;
}

#[derive(Default)]
struct Progress {
    issued: AtomicU64,
    started: AtomicU64,
    consumed: AtomicU64,
    panicked: AtomicU64,
}

impl Progress {
    fn state(&self, ticket: JobTicket) -> Option<JobState> {
        let n = ticket.0;
        if n == 0 {
            None
        } else if n <= self.consumed.load(Ordering::SeqCst) {
            Some(JobState::Consumed)
        } else if n <= self.started.load(Ordering::SeqCst) {
            Some(JobState::Processing)
        } else if n <= self.issued.load(Ordering::SeqCst) {
            Some(JobState::Enqueued)
        } else {
            None
        }
    }

    fn stats(&self) -> QueueStats {
        let issued = self.issued.load(Ordering::SeqCst);
        let started = self.started.load(Ordering::SeqCst);
        let consumed = self.consumed.load(Ordering::SeqCst);
        QueueStats {
            enqueued: issued,
            consumed,
            pending: issued.saturating_sub(started),
            processing: started > consumed,
            panicked: self.panicked.load(Ordering::SeqCst),
        }
    }
}

struct Queued {
    ticket: JobTicket,
    job: WebhookJob,
}

pub struct JobQueue {
    tx: mpsc::Sender<Queued>,
    // Held across the send so channel order matches ticket order
    last_ticket: Mutex<u64>,
    progress: Arc<Progress>,
}

/// Handle to the worker task. Completes once every sender is dropped and
/// the remaining jobs are drained.
pub struct JobWorker {
    task: JoinHandle<()>,
}

impl JobWorker {
    pub async fn join(self) -> anyhow::Result<()> {
        self.task.await?;
        Ok(())
    }
}

impl JobQueue {
    /// Create the queue and spawn its worker.
    pub fn start(handler: Arc<dyn JobHandler>, config: &QueueConfig) -> (Self, JobWorker) {
        let (tx, rx) = mpsc::channel(config.capacity);
        let progress = Arc::new(Progress::default());
        let pause = Duration::from_millis(config.pause_ms);

        let task = tokio::spawn(drain(rx, handler, progress.clone(), pause));

        let queue = Self {
            tx,
            last_ticket: Mutex::new(0),
            progress,
        };
        (queue, JobWorker { task })
    }
}

#[async_trait]
impl JobSink for JobQueue {
    async fn enqueue(&self, job: WebhookJob) -> Result<JobTicket, QueueError> {
        let mut last = self.last_ticket.lock().await;
        let ticket = JobTicket(*last + 1);
        let job_id = job.id;

        // Waits for room when the channel is full
        self.tx
            .send(Queued { ticket, job })
            .await
            .map_err(|_| QueueError::Closed)?;

        *last = ticket.0;
        self.progress.issued.store(ticket.0, Ordering::SeqCst);
        debug!(%job_id, %ticket, "job enqueued");
        Ok(ticket)
    }

    fn state(&self, ticket: JobTicket) -> Option<JobState> {
        self.progress.state(ticket)
    }

    fn stats(&self) -> QueueStats {
        self.progress.stats()
    }
}

async fn drain(
    mut rx: mpsc::Receiver<Queued>,
    handler: Arc<dyn JobHandler>,
    progress: Arc<Progress>,
    pause: Duration,
) {
    info!("job worker started");

    while let Some(Queued { ticket, job }) = rx.recv().await {
        progress.started.store(ticket.0, Ordering::SeqCst);
        run_isolated(&handler, job, &progress).await;
        progress.consumed.store(ticket.0, Ordering::SeqCst);

        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    info!("job worker stopped");
}

/// Run a job in its own task so a panic cannot take the caller down.
async fn run_isolated(handler: &Arc<dyn JobHandler>, job: WebhookJob, progress: &Progress) {
    let job_id = job.id;
    let handler = handler.clone();
    if let Err(e) = tokio::spawn(async move { handler.handle(job).await }).await {
        progress.panicked.fetch_add(1, Ordering::SeqCst);
        error!(%job_id, "job aborted: {}", e);
    }
}

/// Runs each job to completion inside `enqueue`.
pub struct InlineQueue {
    handler: Arc<dyn JobHandler>,
    progress: Progress,
    running: Mutex<()>,
}

impl InlineQueue {
    pub fn new(handler: Arc<dyn JobHandler>) -> Self {
        Self {
            handler,
            progress: Progress::default(),
            running: Mutex::new(()),
        }
    }
}

#[async_trait]
impl JobSink for InlineQueue {
    async fn enqueue(&self, job: WebhookJob) -> Result<JobTicket, QueueError> {
        // Tokio's mutex is fair, so callers run in the order they queued up
        let _running = self.running.lock().await;
        let ticket = JobTicket(self.progress.issued.fetch_add(1, Ordering::SeqCst) + 1);
        self.progress.started.store(ticket.0, Ordering::SeqCst);
        run_isolated(&self.handler, job, &self.progress).await;
        self.progress.consumed.store(ticket.0, Ordering::SeqCst);
        Ok(ticket)
    }

    fn state(&self, ticket: JobTicket) -> Option<JobState> {
        self.progress.state(ticket)
    }

    fn stats(&self) -> QueueStats {
        self.progress.stats()
    }
}
