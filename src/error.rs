//! Error taxonomy for the ingestion pipeline.
//!
//! Every pipeline stage returns a [`MirrorError`]. The category decides how
//! the orchestrator reacts:
//!
//! - **Transient** errors (network, 5xx, timeouts, database) are logged at
//!   `warn` and the affected stage is skipped. Nothing is retried.
//! - **NotFound** errors (missing content, non-file entries, commits already
//!   ingested) are expected and only logged at `debug`.
//! - **DataIntegrity** errors (payload does not match its event kind) are
//!   logged at `error` on the job; the job is still consumed.

use std::fmt;
use thiserror::Error;

/// External collaborator a [`MirrorError::Transient`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    SourceHost,
    BlobStore,
    Embedding,
    Database,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::SourceHost => "source host",
            Service::BlobStore => "blob store",
            Service::Embedding => "embedding service",
            Service::Database => "database",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("{service} failed: {message}")]
    Transient { service: Service, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("data integrity: {0}")]
    DataIntegrity(String),
}

impl MirrorError {
    pub fn transient(service: Service, err: impl fmt::Display) -> Self {
        MirrorError::Transient {
            service,
            message: err.to_string(),
        }
    }

    /// Database failures surface from the store as `anyhow` errors.
    pub fn database(err: anyhow::Error) -> Self {
        MirrorError::Transient {
            service: Service::Database,
            message: format!("{:#}", err),
        }
    }

    /// Expected outcomes that should not be reported as failures.
    pub fn is_expected(&self) -> bool {
        matches!(self, MirrorError::NotFound(_))
    }
}
