//! Repository-level updates from `repository` events.
//!
//! | action | update |
//! |--------|--------|
//! | `publicized` | `private = false` |
//! | `privatized` | `private = true` |
//! | `renamed` | `name`, `full_name` |
//! | `archived` | `archived = true` |
//! | `unarchived` | `archived = false` |
//!
//! Any other action is logged and ignored.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use repo_mirror_core::event::RepositoryMetaPayload;
use repo_mirror_core::models::RepositoryUpdate;
use repo_mirror_core::store::Store;

use crate::error::MirrorError;

#[derive(Debug, PartialEq, Eq)]
pub enum MetadataOutcome {
    Applied(RepositoryUpdate),
    Ignored(String),
}

/// Map an action to the update it implies.
pub fn update_for(payload: &RepositoryMetaPayload) -> Option<RepositoryUpdate> {
    let repo = &payload.repository;
    match payload.action.as_str() {
        "publicized" => Some(RepositoryUpdate::Visibility { private: false }),
        "privatized" => Some(RepositoryUpdate::Visibility { private: true }),
        "renamed" => Some(RepositoryUpdate::Rename {
            name: repo.name.clone(),
            full_name: repo.full_name.clone(),
        }),
        "archived" => Some(RepositoryUpdate::Archived(true)),
        "unarchived" => Some(RepositoryUpdate::Archived(false)),
        _ => None,
    }
}

pub struct MetadataUpdater {
    store: Arc<dyn Store>,
}

impl MetadataUpdater {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(repository_id = %repository_id, action = %payload.action))]
    pub async fn apply(
        &self,
        repository_id: &str,
        payload: &RepositoryMetaPayload,
    ) -> Result<MetadataOutcome, MirrorError> {
        let Some(update) = update_for(payload) else {
            info!("unhandled repository action, ignoring");
            return Ok(MetadataOutcome::Ignored(payload.action.clone()));
        };

        let inserted = self
            .store
            .ensure_repository(&payload.repository.to_repository())
            .await
            .map_err(MirrorError::database)?;
        if inserted {
            debug!("repository first seen");
        }

        let found = self
            .store
            .update_repository(repository_id, &update)
            .await
            .map_err(MirrorError::database)?;
        if !found {
            return Err(MirrorError::NotFound(format!("repository {}", repository_id)));
        }

        info!(?update, "repository updated");
        Ok(MetadataOutcome::Applied(update))
    }
}
