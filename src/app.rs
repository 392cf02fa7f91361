//! Composition root.
//!
//! Builds the concrete collaborators named by the configuration and wires
//! them into a [`Dispatcher`]. The queue is created by the caller, which
//! decides between the background [`JobQueue`](crate::queue::JobQueue) and
//! running jobs inline.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::blob::create_blob_store;
use crate::config::Config;
use crate::db;
use crate::dispatch::{Dispatcher, Services};
use crate::embedding::create_embedding_service;
use crate::source_host::GitHubContents;
use crate::sqlite_store::SqliteStore;

pub struct App {
    pub services: Services,
    pub dispatcher: Arc<Dispatcher>,
}

impl App {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::open(config).await?;
        let source_host = GitHubContents::new(&config.source_host)
            .context("Failed to build source host client")?;
        let blobs = create_blob_store(&config.blob).context("Failed to create blob store")?;
        let embeddings = create_embedding_service(&config.embedding)
            .context("Failed to create embedding service")?;

        info!(
            db = %config.db.path.display(),
            blob_backend = %config.blob.backend,
            embedding = %config.embedding.provider,
            "services ready"
        );

        let services = Services {
            store: Arc::new(SqliteStore::new(pool)),
            source_host: Arc::new(source_host),
            blobs,
            embeddings,
        };
        Self::with_services(services, config)
    }

    /// Wire pre-built collaborators, e.g. fakes in tests.
    pub fn with_services(services: Services, config: &Config) -> Result<Self> {
        let dispatcher = Arc::new(Dispatcher::new(services.clone(), &config.pipeline)?);
        Ok(Self {
            services,
            dispatcher,
        })
    }
}
