//! Filesystem blob backend.
//!
//! Blobs live at `<root>/<first two hex chars>/<digest>`. Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! reader never sees a partial blob.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{blob_reference, reference_digest, BlobStore};
use crate::error::{MirrorError, Service};

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, reference: &str) -> Result<PathBuf, MirrorError> {
        let digest = reference_digest(reference)?;
        Ok(self.root.join(&digest[..2]).join(digest))
    }
}

fn io_error(err: std::io::Error) -> MirrorError {
    MirrorError::transient(Service::BlobStore, err)
}

/// Write `content` to `tmp` and move it to `dest`. The temporary file is
/// removed if either step fails.
async fn write_then_rename(tmp: &Path, dest: &Path, content: &[u8]) -> std::io::Result<()> {
    let result = match tokio::fs::write(tmp, content).await {
        Ok(()) => tokio::fs::rename(tmp, dest).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    result
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, content: &[u8]) -> Result<String, MirrorError> {
        let reference = blob_reference(content);
        let path = self.path_for(&reference)?;

        if tokio::fs::try_exists(&path).await.map_err(io_error)? {
            return Ok(reference);
        }

        let dir = path
            .parent()
            .ok_or_else(|| MirrorError::transient(Service::BlobStore, "blob path has no parent"))?;
        tokio::fs::create_dir_all(dir).await.map_err(io_error)?;

        let digest = reference_digest(&reference)?;
        let tmp = dir.join(format!(".{}.tmp-{}", digest, uuid::Uuid::new_v4()));
        write_then_rename(&tmp, &path, content)
            .await
            .map_err(io_error)?;

        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>, MirrorError> {
        let path = self.path_for(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(MirrorError::NotFound(format!("blob {}", reference)))
            }
            Err(e) => Err(io_error(e)),
        }
    }

    async fn delete(&self, reference: &str) -> Result<(), MirrorError> {
        let path = self.path_for(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}
