use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use ferry_core::{DEFAULT_CODE_LENGTH, TokenSigner};
use ferry_engine::LifecycleConfig;

use crate::error::ServerError;

/// Upload limits, retention and token settings.
#[derive(Debug, Deserialize)]
pub struct LifecycleSettings {
    /// Seconds a downloaded record lingers before it can be reclaimed.
    #[serde(default = "default_retention")]
    pub retention_seconds: u64,
    /// Largest accepted upload in bytes.
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: u64,
    /// Blob prefix uploads are written under.
    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,
    /// Length of generated share codes.
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Code candidates tried before an upload fails.
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,
    /// Hex-encoded HMAC secret for download tokens.
    ///
    /// If not set, a random secret is generated on startup. Tokens are
    /// stored with their record, so they stay valid across restarts either
    /// way.
    pub token_secret: Option<String>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            retention_seconds: default_retention(),
            max_upload_bytes: default_max_upload(),
            upload_prefix: default_upload_prefix(),
            code_length: default_code_length(),
            max_code_attempts: default_max_code_attempts(),
            token_secret: None,
        }
    }
}

impl LifecycleSettings {
    pub fn engine_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            retention: Duration::from_secs(self.retention_seconds),
            max_upload_bytes: self.max_upload_bytes,
            upload_prefix: self.upload_prefix.clone(),
            max_code_attempts: self.max_code_attempts,
            ..LifecycleConfig::default()
        }
    }

    pub fn signer(&self) -> Result<TokenSigner, ServerError> {
        match self.token_secret.as_deref() {
            Some(secret) => TokenSigner::from_hex(secret)
                .map_err(|e| ServerError::Config(format!("lifecycle.token_secret: {e}"))),
            None => {
                info!("no lifecycle.token_secret configured, using a random per-process secret");
                Ok(TokenSigner::random())
            }
        }
    }
}

fn default_retention() -> u64 {
    60
}

fn default_max_upload() -> u64 {
    50 * 1024 * 1024
}

fn default_upload_prefix() -> String {
    "uploads".to_owned()
}

fn default_code_length() -> usize {
    DEFAULT_CODE_LENGTH
}

fn default_max_code_attempts() -> u32 {
    1000
}
