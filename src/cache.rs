//! Local cache store: one JSON blob holding the full collection.
//!
//! The blob is rewritten wholesale after every mutation and read once at
//! startup for offline availability. It is a backup, not the source of
//! truth once a remote channel is bound.

use crate::model::Collection;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to write cache: {0}")]
    Write(#[from] io::Error),
    #[error("failed to encode collection: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached collection. Fails soft: an absent or corrupt blob
    /// yields an empty collection, never an error.
    pub async fn load(&self) -> Collection {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cache at {:?}, starting empty", self.path);
                return Collection::default();
            }
            Err(e) => {
                warn!("Failed to read cache {:?}: {}", self.path, e);
                return Collection::default();
            }
        };

        match serde_json::from_slice::<Collection>(&bytes) {
            Ok(mut collection) => {
                collection.sort();
                collection
            }
            Err(e) => {
                warn!("Corrupt cache {:?}: {}", self.path, e);
                Collection::default()
            }
        }
    }

    /// Persist the full collection. On a quota-class failure, retries once
    /// with all embedded images stripped; if that also fails the error is
    /// logged and swallowed so the caller is never blocked on storage.
    pub async fn save(&self, collection: &Collection) -> Result<(), CacheError> {
        match self.write_blob(collection).await {
            Err(CacheError::Write(e)) if is_quota_error(&e) => {
                warn!("Cache write hit storage quota, retrying without images");
                let stripped = collection.without_images();
                if let Err(e) = self.write_blob(&stripped).await {
                    warn!("Cache write failed even without images: {}", e);
                }
                Ok(())
            }
            other => other,
        }
    }

    /// Write via a temp file and rename so a crash never leaves a torn blob.
    async fn write_blob(&self, collection: &Collection) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(collection)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Remove the blob entirely (sign-out hygiene). Missing file is fine.
    pub async fn clear(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to clear cache {:?}: {}", self.path, e);
            }
        }
    }
}

fn is_quota_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::ENOSPC) | Some(libc::EDQUOT))
}
