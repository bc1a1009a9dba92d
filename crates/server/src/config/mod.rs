mod cleanup;
mod lifecycle;
mod metadata;
mod server;
mod storage;


pub use cleanup::*;
pub use lifecycle::*;
pub use metadata::*;
pub use server::*;
pub use storage::*;

use std::path::Path;

use serde::Deserialize;

use crate::error::ServerError;

/// Top-level configuration for the Ferry server, loaded from a TOML file.
///
/// Every section and field has a default, so an empty file (or no file at
/// all) yields a working single-node setup with in-memory metadata.
#[derive(Debug, Default, Deserialize)]
pub struct FerryConfig {
    /// HTTP bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Blob storage location.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata backend.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Upload limits, retention and token settings.
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    /// Periodic and request-triggered cleanup.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl FerryConfig {
    /// Read `path`, or fall back to defaults when it does not exist.
    ///
    /// Returns the configuration and whether the file was found.
    pub fn load(path: &Path) -> Result<(Self, bool), ServerError> {
        if !path.exists() {
            return Ok((Self::default(), false));
        }
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Ok((config, true))
    }
}
