pub mod error;
pub mod filesystem;
pub mod store;

pub use error::BlobError;
pub use filesystem::FilesystemBlobStore;
pub use store::{BlobEntry, BlobHandle, BlobStore};
