use thiserror::Error;

use ferry_blob::BlobError;
use ferry_store::StoreError;

/// Errors returned by [`LifecycleEngine`](crate::LifecycleEngine) operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No record matches the code (or the code/token pair).
    #[error("file not found")]
    NotFound,

    /// The record exists but has already been downloaded or has expired.
    #[error("file no longer available")]
    Gone,

    /// The record is live but its blob is absent from storage.
    #[error("file not found on server")]
    BlobMissing,

    /// The upload could not be persisted to blob storage. No record was created.
    #[error("storage write failed: {0}")]
    StorageWrite(#[source] BlobError),

    /// No unused share code was found within the attempt budget.
    #[error("no unique code after {0} attempts")]
    CodeGenerationExhausted(u32),

    /// The request was rejected before touching storage. The message is safe
    /// to return to callers.
    #[error("{0}")]
    Validation(String),

    /// The engine was built without a required component.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An error occurred in the metadata store.
    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),

    /// An error occurred in the blob store.
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),
}

/// Engine-level sweep failures.
///
/// Per-record problems never surface here; they are collected in the sweep
/// report instead.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Candidate records or the referenced path set could not be read.
    #[error("metadata query failed: {0}")]
    Store(#[from] StoreError),

    /// The blob prefix could not be listed.
    #[error("blob listing failed: {0}")]
    Blob(#[from] BlobError),
}
