use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Directory prefix under which cover images are stored.
pub const COVER_PREFIX: &str = "covers";

/// Error type for BlobStore operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// Represents an I/O failure of the backing storage.
    #[error("Blob storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Represents a key that does not resolve to a location inside the store.
    #[error("Invalid blob key '{0}'")]
    InvalidKey(String),
}

/// Opaque binary storage addressed by key.
///
/// Keys are relative paths such as `covers/<uuid>.png`. Deleting a missing key
/// is not an error.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under a freshly generated key and returns that key.
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<String, BlobError>;

    /// Removes the blob stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Generates a new, unique key for a cover image.
pub fn new_cover_key(extension: &str) -> String {
    format!("{}/{}.{}", COVER_PREFIX, uuid::Uuid::new_v4(), extension)
}

/// BlobStore backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the directory all keys are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to a path, rejecting anything that could escape the root.
    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<String, BlobError> {
        let key = new_cover_key(extension);
        let path = self.path_for(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Stored blob {}", key);
        Ok(key)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Blob {} already absent", key);
                Ok(())
            }
            Err(err) => Err(BlobError::Io(err)),
        }
    }
}
