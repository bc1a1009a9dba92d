use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use ferry_blob::{BlobError, BlobHandle, BlobStore};
use ferry_core::{
    Clock, CodeGenerator, FileRecord, TokenSigner, expiry_after, is_well_formed, storage_path_for,
};
use ferry_store::MetadataStore;

use crate::error::LifecycleError;
use crate::metrics::EngineMetrics;

/// Tunables for the lifecycle engine.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// How long a downloaded record lingers before it becomes reclaimable.
    pub retention: Duration,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Blob store prefix uploads are written under.
    pub upload_prefix: String,
    /// Code candidates tried before giving up.
    pub max_code_attempts: u32,
    /// Storage path variants tried when a path is already taken.
    pub max_path_attempts: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(60),
            max_upload_bytes: 50 * 1024 * 1024,
            upload_prefix: String::from("uploads"),
            max_code_attempts: 1000,
            max_path_attempts: 16,
        }
    }
}

/// An upload as received from a client.
#[derive(Debug, Clone)]
pub struct NewUpload {
    /// Client-supplied filename.
    pub filename: String,
    /// Client-supplied MIME type, if any.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Bytes,
}

/// What an info lookup returns to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub download_token: String,
    pub created_at: DateTime<Utc>,
}

impl FileInfo {
    fn new(record: &FileRecord, download_token: String) -> Self {
        Self {
            filename: record.original_filename.clone(),
            size: record.file_size,
            content_type: record.content_type.clone(),
            download_token,
            created_at: record.created_at,
        }
    }
}

/// A consumed download: the record after the transition and its open blob.
#[derive(Debug)]
pub struct Download {
    pub record: FileRecord,
    pub handle: BlobHandle,
}

/// Owns the file state machine.
///
/// Records move from available to downloaded exactly once; every transition
/// is delegated to a single conditional store operation so concurrent
/// requests cannot both win.
pub struct LifecycleEngine {
    pub(crate) store: Arc<dyn MetadataStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) signer: TokenSigner,
    pub(crate) codes: Arc<dyn CodeGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: LifecycleConfig,
    pub(crate) metrics: Arc<EngineMetrics>,
}

impl LifecycleEngine {
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Store an upload and create its record.
    ///
    /// The blob is written before the record is inserted, so a failed write
    /// never leaves a record without content. If the insert then fails the
    /// blob is removed on a best-effort basis.
    #[instrument(
        name = "lifecycle.create_record",
        skip_all,
        fields(filename = %upload.filename, size = upload.data.len())
    )]
    pub async fn create_record(&self, upload: NewUpload) -> Result<FileRecord, LifecycleError> {
        let filename = upload.filename.trim();
        if filename.is_empty() {
            return Err(LifecycleError::Validation("No file provided".into()));
        }
        let size = upload.data.len() as u64;
        if size > self.config.max_upload_bytes {
            return Err(LifecycleError::Validation(format!(
                "File size exceeds {}MB limit",
                self.config.max_upload_bytes / (1024 * 1024)
            )));
        }

        let now = self.clock.now();
        let mut attempts = 0;
        let code = self.fresh_code(&mut attempts).await?;
        let storage_path = self.write_blob(filename, now, upload.data).await?;

        let mut record = FileRecord::new(
            code,
            filename,
            size,
            upload.content_type.as_deref(),
            storage_path,
            now,
        );

        loop {
            match self.store.insert(&record).await {
                Ok(true) => break,
                Ok(false) => {
                    debug!(code = %record.code, "code taken at insert, retrying");
                    match self.fresh_code(&mut attempts).await {
                        Ok(code) => record.code = code,
                        Err(e) => {
                            self.discard_blob(&record.storage_path).await;
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    self.discard_blob(&record.storage_path).await;
                    return Err(e.into());
                }
            }
        }

        self.metrics.increment_uploads();
        info!(code = %record.code, size, "file uploaded");
        Ok(record)
    }

    /// Issue a fresh download token for an available record.
    ///
    /// Each call replaces the previous token.
    #[instrument(name = "lifecycle.issue_token", skip(self))]
    pub async fn issue_token(&self, code: &str) -> Result<FileInfo, LifecycleError> {
        if !is_well_formed(code) {
            return Err(LifecycleError::NotFound);
        }
        let now = self.clock.now();
        let record = self
            .store
            .get(code)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        if !record.is_available_at(now) {
            return Err(LifecycleError::Gone);
        }

        let token = self.signer.issue(code, now);
        if let Some(updated) = self.store.assign_token(code, &token, now).await? {
            self.metrics.increment_tokens_issued();
            debug!("download token issued");
            return Ok(FileInfo::new(&updated, token));
        }

        // Lost a race with a download or a sweep.
        match self.store.get(code).await? {
            Some(_) => Err(LifecycleError::Gone),
            None => Err(LifecycleError::NotFound),
        }
    }

    /// Check a code/token pair without consuming it.
    ///
    /// Used for `HEAD` requests: the pair, availability and blob presence are
    /// all validated, but nothing is mutated.
    #[instrument(name = "lifecycle.inspect_download", skip(self, token))]
    pub async fn inspect_download(
        &self,
        code: &str,
        token: &str,
    ) -> Result<FileRecord, LifecycleError> {
        let record = self.lookup_available(code, token).await?;
        if !self.blobs.exists(&record.storage_path).await? {
            warn!("blob missing for live record");
            return Err(LifecycleError::BlobMissing);
        }
        Ok(record)
    }

    /// Consume a code/token pair and open the blob for streaming.
    ///
    /// The blob is opened before the record transitions, so a missing blob
    /// never burns the single use. Of several concurrent callers presenting
    /// the same pair, exactly one succeeds; the rest get [`LifecycleError::Gone`].
    #[instrument(name = "lifecycle.consume_token", skip(self, token))]
    pub async fn consume_token(&self, code: &str, token: &str) -> Result<Download, LifecycleError> {
        let record = self.lookup_available(code, token).await?;

        let Some(handle) = self.blobs.open(&record.storage_path).await? else {
            warn!("blob missing for live record");
            return Err(LifecycleError::BlobMissing);
        };

        let now = self.clock.now();
        let expires_at = expiry_after(now, self.config.retention);
        let record = self
            .store
            .mark_downloaded(code, token, now, expires_at)
            .await?
            .ok_or(LifecycleError::Gone)?;

        self.metrics.increment_downloads();
        info!(%expires_at, "file downloaded");
        Ok(Download { record, handle })
    }

    async fn lookup_available(&self, code: &str, token: &str) -> Result<FileRecord, LifecycleError> {
        if !is_well_formed(code) || token.is_empty() {
            return Err(LifecycleError::NotFound);
        }
        let record = self
            .store
            .get_by_token(code, token)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        if !record.is_available_at(self.clock.now()) {
            return Err(LifecycleError::Gone);
        }
        Ok(record)
    }

    /// Draw candidates until one is unused, sharing `attempts` across calls.
    async fn fresh_code(&self, attempts: &mut u32) -> Result<String, LifecycleError> {
        while *attempts < self.config.max_code_attempts {
            *attempts += 1;
            let candidate = self.codes.next_code();
            if !self.store.code_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        warn!(attempts = *attempts, "code space exhausted");
        Err(LifecycleError::CodeGenerationExhausted(*attempts))
    }

    async fn write_blob(
        &self,
        filename: &str,
        now: DateTime<Utc>,
        data: Bytes,
    ) -> Result<String, LifecycleError> {
        let mut last_path = String::new();
        for attempt in 0..self.config.max_path_attempts.max(1) {
            let path = storage_path_for(&self.config.upload_prefix, filename, now, attempt);
            match self.blobs.write(&path, data.clone()).await {
                Ok(()) => return Ok(path),
                Err(BlobError::AlreadyExists(_)) => last_path = path,
                Err(e) => {
                    warn!(error = %e, "blob write failed");
                    return Err(LifecycleError::StorageWrite(e));
                }
            }
        }
        Err(LifecycleError::StorageWrite(BlobError::AlreadyExists(
            last_path,
        )))
    }

    async fn discard_blob(&self, path: &str) {
        if let Err(e) = self.blobs.delete(path).await {
            warn!(error = %e, "failed to remove blob of rejected upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::TimeZone;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::test_support::{Harness, HarnessOptions, ScriptedCodes};

    fn fixed_start() -> HarnessOptions {
        HarnessOptions {
            start: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            ..HarnessOptions::default()
        }
    }

    fn upload(name: &str, body: &'static [u8]) -> NewUpload {
        NewUpload {
            filename: name.into(),
            content_type: Some("text/plain".into()),
            data: Bytes::from_static(body),
        }
    }

    async fn read_all(handle: BlobHandle) -> Vec<u8> {
        let mut buf = Vec::new();
        handle.into_reader().read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn upload_creates_record_and_blob() {
        let h = Harness::with(fixed_start());
        let record = h.engine.create_record(upload("notes.txt", b"hello")).await.unwrap();

        assert_eq!(record.code.len(), 8);
        assert_eq!(record.file_size, 5);
        assert!(record.storage_path.starts_with("uploads/20240501_120000_000000_notes"));
        assert!(record.storage_path.ends_with(".txt"));
        assert!(h.blobs.exists(&record.storage_path).await.unwrap());
        assert_eq!(h.store.get(&record.code).await.unwrap(), Some(record));
        assert_eq!(h.metrics.snapshot().uploads, 1);
    }

    #[tokio::test]
    async fn upload_validation() {
        let h = Harness::with(HarnessOptions {
            config: LifecycleConfig {
                max_upload_bytes: 4,
                ..LifecycleConfig::default()
            },
            ..HarnessOptions::default()
        });

        let err = h.engine.create_record(upload("  ", b"x")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));

        let err = h.engine.create_record(upload("big.bin", b"12345")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));

        assert_eq!(h.store.count().await.unwrap(), 0);
        assert!(h.blobs.list("uploads").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn colliding_codes_are_skipped() {
        let h = Harness::with(HarnessOptions {
            codes: Some(Arc::new(ScriptedCodes::new(&["AAAAAAAA", "AAAAAAAA", "BBBBBBBB"]))),
            ..HarnessOptions::default()
        });

        let first = h.engine.create_record(upload("a.txt", b"a")).await.unwrap();
        let second = h.engine.create_record(upload("b.txt", b"b")).await.unwrap();
        assert_eq!(first.code, "AAAAAAAA");
        assert_eq!(second.code, "BBBBBBBB");
    }

    #[tokio::test]
    async fn exhausted_code_space_is_reported() {
        let h = Harness::with(HarnessOptions {
            codes: Some(Arc::new(ScriptedCodes::new(&[]))),
            config: LifecycleConfig {
                max_code_attempts: 3,
                ..LifecycleConfig::default()
            },
            ..HarnessOptions::default()
        });
        h.engine.create_record(upload("a.txt", b"a")).await.unwrap();

        let err = h.engine.create_record(upload("b.txt", b"b")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::CodeGenerationExhausted(3)));
        assert_eq!(h.blobs.list("uploads").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_name_same_instant_gets_distinct_paths() {
        let h = Harness::with(fixed_start());
        let a = h.engine.create_record(upload("same.txt", b"1")).await.unwrap();
        let b = h.engine.create_record(upload("same.txt", b"2")).await.unwrap();

        assert_ne!(a.storage_path, b.storage_path);
        assert!(b.storage_path.ends_with("_same_1.txt"));
    }

    #[tokio::test]
    async fn failed_insert_removes_blob() {
        let h = Harness::new();
        h.store.fail_inserts.store(true, Ordering::SeqCst);

        let err = h.engine.create_record(upload("a.txt", b"a")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Store(_)));
        assert!(h.blobs.list("uploads").await.unwrap().is_empty());
        assert_eq!(h.metrics.snapshot().uploads, 0);
    }

    #[tokio::test]
    async fn info_rotates_token() {
        let h = Harness::new();
        let record = h.upload("a.txt", b"a").await;

        let first = h.engine.issue_token(&record.code).await.unwrap();
        let second = h.engine.issue_token(&record.code).await.unwrap();
        assert_ne!(first.download_token, second.download_token);
        assert_eq!(second.filename, "a.txt");
        assert_eq!(second.content_type, "text/plain");

        // The superseded token no longer works.
        let err = h
            .engine
            .consume_token(&record.code, &first.download_token)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound));
        assert!(h.engine.consume_token(&record.code, &second.download_token).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let h = Harness::new();
        assert!(matches!(
            h.engine.issue_token("NoSuch12").await,
            Err(LifecycleError::NotFound)
        ));
        assert!(matches!(
            h.engine.issue_token("../../x").await,
            Err(LifecycleError::NotFound)
        ));
    }

    #[tokio::test]
    async fn single_use_download() {
        let h = Harness::new();
        let record = h.upload("a.txt", b"payload").await;
        let info = h.engine.issue_token(&record.code).await.unwrap();

        h.clock.advance(Duration::from_secs(5));
        let download = h
            .engine
            .consume_token(&record.code, &info.download_token)
            .await
            .unwrap();
        assert!(download.record.is_downloaded);
        assert_eq!(download.record.download_count, 1);
        assert_eq!(
            download.record.expires_at,
            Some(h.clock.now() + chrono::Duration::seconds(60))
        );
        assert_eq!(read_all(download.handle).await, b"payload");

        let again = h.engine.consume_token(&record.code, &info.download_token).await;
        assert!(matches!(again, Err(LifecycleError::Gone)));
        assert!(matches!(
            h.engine.issue_token(&record.code).await,
            Err(LifecycleError::Gone)
        ));
    }

    #[tokio::test]
    async fn head_does_not_consume() {
        let h = Harness::new();
        let record = h.upload("a.txt", b"abc").await;
        let info = h.engine.issue_token(&record.code).await.unwrap();

        for _ in 0..3 {
            let seen = h
                .engine
                .inspect_download(&record.code, &info.download_token)
                .await
                .unwrap();
            assert!(!seen.is_downloaded);
        }
        assert!(h.engine.consume_token(&record.code, &info.download_token).await.is_ok());
    }

    #[tokio::test]
    async fn missing_blob_does_not_burn_the_download() {
        let h = Harness::new();
        let record = h.upload("a.txt", b"abc").await;
        let info = h.engine.issue_token(&record.code).await.unwrap();
        h.blobs.delete(&record.storage_path).await.unwrap();

        assert!(matches!(
            h.engine.inspect_download(&record.code, &info.download_token).await,
            Err(LifecycleError::BlobMissing)
        ));
        assert!(matches!(
            h.engine.consume_token(&record.code, &info.download_token).await,
            Err(LifecycleError::BlobMissing)
        ));

        let stored = h.store.get(&record.code).await.unwrap().unwrap();
        assert!(!stored.is_downloaded);
        assert_eq!(stored.download_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_downloads_have_one_winner() {
        let h = Harness::new();
        let record = h.upload("a.txt", b"abc").await;
        let info = h.engine.issue_token(&record.code).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = Arc::clone(&h.engine);
            let code = record.code.clone();
            let token = info.download_token.clone();
            handles.push(tokio::spawn(async move {
                engine.consume_token(&code, &token).await.map(|_| ())
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(LifecycleError::Gone) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(h.metrics.snapshot().downloads, 1);
    }
}
