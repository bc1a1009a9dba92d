use std::sync::Arc;

use tracing::info;

use ferry_blob::{BlobStore, FilesystemBlobStore};
use ferry_core::RandomCodeGenerator;
use ferry_engine::{
    EngineMetrics, InlineCleanupTrigger, LifecycleEngine, LifecycleEngineBuilder, Sweeper,
};
use ferry_store::MetadataStore;

use crate::config::FerryConfig;
use crate::error::ServerError;
use crate::store_factory::{StoreSetup, create_metadata_store};

/// The engine, the sweeper and the inline trigger, wired to one set of stores.
#[derive(Clone)]
pub struct Services {
    pub engine: Arc<LifecycleEngine>,
    pub sweeper: Arc<Sweeper>,
    pub inline: Arc<InlineCleanupTrigger>,
    pub metrics: Arc<EngineMetrics>,
}

impl Services {
    /// Build the stores named by `config` and wire everything to them.
    pub async fn from_config(config: &FerryConfig) -> Result<Self, ServerError> {
        Self::open(config, StoreSetup::Prepare).await
    }

    /// Like [`Services::from_config`], but `setup` decides whether storage
    /// validation and migrations run.
    pub async fn open(config: &FerryConfig, setup: StoreSetup) -> Result<Self, ServerError> {
        let blobs = FilesystemBlobStore::new(&config.storage.root);
        if config.storage.validate_on_start && setup == StoreSetup::Prepare {
            blobs
                .validate()
                .await
                .map_err(|e| ServerError::Config(format!("storage.root: {e}")))?;
            info!(root = %config.storage.root, "blob storage validated");
        }

        let store = create_metadata_store(&config.metadata, setup).await?;
        info!(backend = %config.metadata.backend, "metadata store initialized");

        Self::assemble(store, Arc::new(blobs), config)
    }

    /// Wire the engine and cleanup to existing stores.
    pub fn assemble(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        config: &FerryConfig,
    ) -> Result<Self, ServerError> {
        let metrics = Arc::new(EngineMetrics::default());

        let engine = LifecycleEngineBuilder::new()
            .store(store)
            .blobs(blobs)
            .signer(config.lifecycle.signer()?)
            .codes(Arc::new(RandomCodeGenerator::new(
                config.lifecycle.code_length,
            )))
            .config(config.lifecycle.engine_config())
            .metrics(Arc::clone(&metrics))
            .build()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let engine = Arc::new(engine);

        let sweeper = Arc::new(Sweeper::from_engine(&engine, config.cleanup.sweeper()));
        let inline = Arc::new(InlineCleanupTrigger::new(
            Arc::clone(&sweeper),
            config.cleanup.inline(),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            engine,
            sweeper,
            inline,
            metrics,
        })
    }
}
