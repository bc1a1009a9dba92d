//! Fixtures shared by the engine's unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use ferry_blob::{BlobEntry, BlobError, BlobHandle, BlobStore, FilesystemBlobStore};
use ferry_core::{CodeGenerator, FileRecord, ManualClock};
use ferry_store::{MetadataStore, StoreError};
use ferry_store_memory::MemoryMetadataStore;

use crate::builder::LifecycleEngineBuilder;
use crate::lifecycle::{LifecycleConfig, LifecycleEngine, NewUpload};
use crate::metrics::EngineMetrics;
use crate::sweeper::{Sweeper, SweeperConfig};

/// Hands out a fixed sequence of codes, then repeats a fallback forever.
pub struct ScriptedCodes(Mutex<VecDeque<&'static str>>);

impl ScriptedCodes {
    pub fn new(codes: &[&'static str]) -> Self {
        Self(Mutex::new(codes.iter().copied().collect()))
    }
}

impl CodeGenerator for ScriptedCodes {
    fn next_code(&self) -> String {
        self.0.lock().pop_front().unwrap_or("ZZZZZZZZ").to_owned()
    }
}

/// Memory store with switchable failures.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryMetadataStore,
    pub fail_inserts: AtomicBool,
    pub fail_queries: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Connection("database unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetadataStore for FlakyStore {
    async fn insert(&self, record: &FileRecord) -> Result<bool, StoreError> {
        Self::check(&self.fail_inserts)?;
        self.inner.insert(record).await
    }
    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        self.inner.code_exists(code).await
    }
    async fn get(&self, code: &str) -> Result<Option<FileRecord>, StoreError> {
        self.inner.get(code).await
    }
    async fn get_by_token(&self, code: &str, token: &str) -> Result<Option<FileRecord>, StoreError> {
        self.inner.get_by_token(code, token).await
    }
    async fn assign_token(
        &self,
        code: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, StoreError> {
        self.inner.assign_token(code, token, now).await
    }
    async fn mark_downloaded(
        &self,
        code: &str,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, StoreError> {
        self.inner.mark_downloaded(code, token, now, expires_at).await
    }
    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        self.inner.delete(code).await
    }
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError> {
        Self::check(&self.fail_queries)?;
        self.inner.list_expired(now).await
    }
    async fn list_downloaded(&self) -> Result<Vec<FileRecord>, StoreError> {
        Self::check(&self.fail_queries)?;
        self.inner.list_downloaded().await
    }
    async fn storage_paths(&self) -> Result<HashSet<String>, StoreError> {
        Self::check(&self.fail_queries)?;
        self.inner.storage_paths().await
    }
    async fn count(&self) -> Result<u64, StoreError> {
        self.inner.count().await
    }
}

/// Filesystem blob store with switchable failures.
pub struct FlakyBlobs {
    pub inner: FilesystemBlobStore,
    pub fail_deletes: AtomicBool,
    pub fail_list: AtomicBool,
}

impl FlakyBlobs {
    pub fn new(inner: FilesystemBlobStore) -> Self {
        Self {
            inner,
            fail_deletes: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
        }
    }

    fn denied(path: &str) -> BlobError {
        BlobError::Io {
            path: path.to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
    }
}

#[async_trait]
impl BlobStore for FlakyBlobs {
    async fn write(&self, path: &str, data: Bytes) -> Result<(), BlobError> {
        self.inner.write(path, data).await
    }
    async fn exists(&self, path: &str) -> Result<bool, BlobError> {
        self.inner.exists(path).await
    }
    async fn open(&self, path: &str) -> Result<Option<BlobHandle>, BlobError> {
        self.inner.open(path).await
    }
    async fn delete(&self, path: &str) -> Result<bool, BlobError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::denied(path));
        }
        self.inner.delete(path).await
    }
    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, BlobError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::denied(prefix));
        }
        self.inner.list(prefix).await
    }
}

/// An engine and a sweeper wired to the same stores and clock.
pub struct Harness {
    _dir: tempfile::TempDir,
    pub engine: Arc<LifecycleEngine>,
    pub sweeper: Arc<Sweeper>,
    pub store: Arc<FlakyStore>,
    pub blobs: Arc<FlakyBlobs>,
    pub clock: ManualClock,
    pub metrics: Arc<EngineMetrics>,
}

pub struct HarnessOptions {
    pub start: DateTime<Utc>,
    pub codes: Option<Arc<dyn CodeGenerator>>,
    pub config: LifecycleConfig,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            // Real time, so filesystem mtimes line up with the manual clock.
            start: Utc::now(),
            codes: None,
            config: LifecycleConfig::default(),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HarnessOptions::default())
    }

    pub fn with(options: HarnessOptions) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FlakyStore::default());
        let blobs = Arc::new(FlakyBlobs::new(FilesystemBlobStore::new(dir.path())));
        let clock = ManualClock::new(options.start);
        let metrics = Arc::new(EngineMetrics::default());

        let mut builder = LifecycleEngineBuilder::new()
            .store(Arc::clone(&store) as Arc<dyn MetadataStore>)
            .blobs(Arc::clone(&blobs) as Arc<dyn BlobStore>)
            .clock(Arc::new(clock.clone()))
            .metrics(Arc::clone(&metrics))
            .config(options.config);
        if let Some(codes) = options.codes {
            builder = builder.codes(codes);
        }
        let engine = Arc::new(builder.build().expect("engine"));
        let sweeper = Arc::new(Sweeper::from_engine(&engine, SweeperConfig::default()));

        Self {
            _dir: dir,
            engine,
            sweeper,
            store,
            blobs,
            clock,
            metrics,
        }
    }

    /// Upload a small text file and return its record.
    pub async fn upload(&self, name: &str, body: &'static [u8]) -> FileRecord {
        self.engine
            .create_record(NewUpload {
                filename: name.into(),
                content_type: Some("text/plain".into()),
                data: Bytes::from_static(body),
            })
            .await
            .expect("upload")
    }

    /// Upload, issue a token and consume it. Returns the downloaded record.
    pub async fn upload_and_download(&self, name: &str) -> FileRecord {
        let record = self.upload(name, b"content").await;
        let info = self.engine.issue_token(&record.code).await.expect("token");
        self.engine
            .consume_token(&record.code, &info.download_token)
            .await
            .expect("download")
            .record
    }

    /// Write a blob that no record references.
    pub async fn plant_orphan(&self, path: &str) {
        self.blobs
            .inner
            .write(path, Bytes::from_static(b"orphan"))
            .await
            .expect("orphan write");
    }
}
