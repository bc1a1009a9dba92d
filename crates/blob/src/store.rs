use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::error::BlobError;

/// A listed blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// `/`-separated path relative to the store root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time as reported by the backend.
    pub modified_at: DateTime<Utc>,
}

/// An open blob ready to be streamed.
///
/// The handle owns the underlying reader; dropping it releases the resource
/// whether or not the content was fully read.
pub struct BlobHandle {
    size: u64,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl BlobHandle {
    pub fn new(size: u64, reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self { size, reader }
    }

    /// Size of the blob in bytes at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Take the reader.
    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.reader
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Storage for uploaded file contents.
///
/// Paths are store-relative and `/`-separated. Implementations must reject
/// absolute paths and `..` components with [`BlobError::InvalidPath`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` at `path`.
    ///
    /// Fails with [`BlobError::AlreadyExists`] if something is already there;
    /// a partially written blob is never visible at `path`.
    async fn write(&self, path: &str, data: Bytes) -> Result<(), BlobError>;

    /// Returns `true` if a blob exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, BlobError>;

    /// Open a blob for streaming. Returns `None` if it does not exist.
    async fn open(&self, path: &str) -> Result<Option<BlobHandle>, BlobError>;

    /// Delete a blob. Returns `false` if it was already absent.
    async fn delete(&self, path: &str) -> Result<bool, BlobError>;

    /// Recursively list every blob under `prefix`.
    ///
    /// A prefix that does not exist yields an empty list.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, BlobError>;
}
