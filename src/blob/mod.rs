//! Blob storage for raw file content.
//!
//! Defines the [`BlobStore`] trait and its backends:
//! - **[`MemoryBlobStore`]**: process-local map, for tests and dry runs.
//! - **[`FsBlobStore`]**: content-addressed files under a root directory.
//! - **[`S3BlobStore`]**: objects in an S3 (or S3-compatible) bucket, signed
//!   with AWS Signature V4.
//!
//! References are content addressed: `sha256-<hex digest>`. Putting the same
//! bytes twice yields the same reference, so re-processing a replayed commit
//! never creates a second copy.

mod fs;
mod s3;

pub use fs::FsBlobStore;
pub use s3::S3BlobStore;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::BlobConfig;
use crate::error::{MirrorError, Service};

const REFERENCE_PREFIX: &str = "sha256-";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content`, returning its stable reference.
    async fn put(&self, content: &[u8]) -> Result<String, MirrorError>;

    async fn get(&self, reference: &str) -> Result<Vec<u8>, MirrorError>;

    /// Remove a blob. Deleting an absent blob is not an error.
    async fn delete(&self, reference: &str) -> Result<(), MirrorError>;
}

/// Reference for `content`: `sha256-<hex>`.
pub fn blob_reference(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{}", REFERENCE_PREFIX, hex::encode(hasher.finalize()))
}

/// Hex digest inside a reference, rejecting anything that is not one.
///
/// Backends build paths and object keys from this, so it must never carry
/// separators or traversal sequences.
pub(crate) fn reference_digest(reference: &str) -> Result<&str, MirrorError> {
    match reference.strip_prefix(REFERENCE_PREFIX) {
        Some(digest) if digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit()) => {
            Ok(digest)
        }
        _ => Err(MirrorError::DataIntegrity(format!(
            "malformed blob reference: '{}'",
            reference
        ))),
    }
}

/// Create the configured [`BlobStore`] backend.
pub fn create_blob_store(config: &BlobConfig) -> Result<Arc<dyn BlobStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryBlobStore::new())),
        "filesystem" => {
            let root = config
                .root
                .clone()
                .ok_or_else(|| anyhow::anyhow!("blob.root required for filesystem backend"))?;
            Ok(Arc::new(FsBlobStore::new(root)))
        }
        "s3" => Ok(Arc::new(S3BlobStore::from_env(config)?)),
        other => bail!("Unknown blob backend: {}", other),
    }
}

/// Blob store backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.blobs
            .read()
            .map(|b| b.contains_key(reference))
            .unwrap_or(false)
    }
}

fn poisoned() -> MirrorError {
    MirrorError::transient(Service::BlobStore, "memory blob store lock poisoned")
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, content: &[u8]) -> Result<String, MirrorError> {
        let reference = blob_reference(content);
        self.blobs
            .write()
            .map_err(|_| poisoned())?
            .entry(reference.clone())
            .or_insert_with(|| content.to_vec());
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>, MirrorError> {
        self.blobs
            .read()
            .map_err(|_| poisoned())?
            .get(reference)
            .cloned()
            .ok_or_else(|| MirrorError::NotFound(format!("blob {}", reference)))
    }

    async fn delete(&self, reference: &str) -> Result<(), MirrorError> {
        self.blobs.write().map_err(|_| poisoned())?.remove(reference);
        Ok(())
    }
}
