use std::sync::Arc;

use ferry_blob::BlobStore;
use ferry_core::{Clock, CodeGenerator, RandomCodeGenerator, SystemClock, TokenSigner};
use ferry_store::MetadataStore;

use crate::error::LifecycleError;
use crate::lifecycle::{LifecycleConfig, LifecycleEngine};
use crate::metrics::EngineMetrics;

/// Fluent builder for constructing a [`LifecycleEngine`].
///
/// A [`MetadataStore`] and a [`BlobStore`] must be supplied. Everything else
/// defaults: random 8-character codes, the system clock, a per-process random
/// token secret, and [`LifecycleConfig::default`].
pub struct LifecycleEngineBuilder {
    store: Option<Arc<dyn MetadataStore>>,
    blobs: Option<Arc<dyn BlobStore>>,
    signer: Option<TokenSigner>,
    codes: Option<Arc<dyn CodeGenerator>>,
    clock: Option<Arc<dyn Clock>>,
    config: LifecycleConfig,
    metrics: Option<Arc<EngineMetrics>>,
}

impl LifecycleEngineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            blobs: None,
            signer: None,
            codes: None,
            clock: None,
            config: LifecycleConfig::default(),
            metrics: None,
        }
    }

    /// Set the metadata store implementation.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the blob store implementation.
    #[must_use]
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Set the token signer.
    #[must_use]
    pub fn signer(mut self, signer: TokenSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Replace the share code generator.
    #[must_use]
    pub fn codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = Some(codes);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a metrics instance with the sweeper and the HTTP layer.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Configuration`] if a required component is
    /// missing.
    pub fn build(self) -> Result<LifecycleEngine, LifecycleError> {
        let store = self
            .store
            .ok_or_else(|| LifecycleError::Configuration("metadata store is required".into()))?;
        let blobs = self
            .blobs
            .ok_or_else(|| LifecycleError::Configuration("blob store is required".into()))?;

        Ok(LifecycleEngine {
            store,
            blobs,
            signer: self.signer.unwrap_or_else(TokenSigner::random),
            codes: self
                .codes
                .unwrap_or_else(|| Arc::new(RandomCodeGenerator::default())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

impl Default for LifecycleEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
