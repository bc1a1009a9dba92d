use thiserror::Error;

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The path is absolute, empty, or escapes the store root.
    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    /// A blob already exists at the path. Writes never overwrite.
    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    /// An I/O error from the underlying storage.
    #[error("blob storage error at {path}: {source}")]
    Io {
        /// Store-relative path being operated on.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The startup self-check failed.
    #[error("blob storage validation failed: {0}")]
    Validation(String),
}

impl BlobError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
