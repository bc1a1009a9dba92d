use tracing::{debug, info, instrument, warn};

use ferry_core::FileRecord;

use super::{ExpiryReport, SweepOptions, Sweeper};
use crate::error::SweepError;

impl Sweeper {
    /// Reclaim expired records and their blobs.
    ///
    /// Candidates are records with `expires_at < now`, or every downloaded
    /// record when `options.force` is set. For each one the blob goes first:
    /// an already-absent blob is logged and the record is still removed, but
    /// a failed blob delete leaves the record in place for the next pass.
    /// Every fetched candidate is attempted regardless of earlier failures.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Store`] if the candidate query fails.
    #[instrument(
        name = "sweeper.expiry_pass",
        skip(self),
        fields(dry_run = options.dry_run, force = options.force)
    )]
    pub async fn expiry_pass(&self, options: SweepOptions) -> Result<ExpiryReport, SweepError> {
        let now = self.clock.now();
        let candidates = if options.force {
            self.store.list_downloaded().await?
        } else {
            self.store.list_expired(now).await?
        };

        let mut report = ExpiryReport {
            candidates: candidates.len() as u64,
            ..ExpiryReport::default()
        };
        debug!(candidates = report.candidates, "expiry candidates selected");

        for record in &candidates {
            if options.dry_run {
                self.preview(record, &mut report).await;
            } else {
                self.reclaim(record, &mut report).await;
            }
        }

        Ok(report)
    }

    async fn preview(&self, record: &FileRecord, report: &mut ExpiryReport) {
        match self.blobs.exists(&record.storage_path).await {
            Ok(true) => report.blobs_deleted += 1,
            Ok(false) => report.blobs_missing += 1,
            Err(e) => report
                .errors
                .push(format!("{}: blob check failed: {e}", record.code)),
        }
        report.records_deleted += 1;
        report.reclaimed.push(record.code.clone());
        info!(code = %record.code, filename = %record.original_filename, "would delete");
    }

    async fn reclaim(&self, record: &FileRecord, report: &mut ExpiryReport) {
        let code = record.code.as_str();

        match self.blobs.delete(&record.storage_path).await {
            Ok(true) => report.blobs_deleted += 1,
            Ok(false) => {
                warn!(code, "blob already absent, removing record anyway");
                report.blobs_missing += 1;
            }
            Err(e) => {
                warn!(code, error = %e, "blob delete failed, keeping record");
                report.errors.push(format!("{code}: blob delete failed: {e}"));
                return;
            }
        }

        match self.store.delete(code).await {
            Ok(true) => {
                report.records_deleted += 1;
                report.reclaimed.push(record.code.clone());
                debug!(code, "record reclaimed");
            }
            // A concurrent sweep got there first.
            Ok(false) => debug!(code, "record already removed"),
            Err(e) => {
                warn!(code, error = %e, "record delete failed");
                report.errors.push(format!("{code}: record delete failed: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use ferry_blob::BlobStore;
    use ferry_store::MetadataStore;

    use crate::sweeper::{MAX_REPORTED_ERRORS, SweepOptions};
    use crate::test_support::Harness;

    #[tokio::test]
    async fn expired_record_and_blob_are_reclaimed() {
        let h = Harness::new();
        let record = h.upload_and_download("a.txt").await;

        // Exactly at expiry nothing happens.
        h.clock.advance(Duration::from_secs(60));
        let report = h.sweeper.expiry_pass(SweepOptions::periodic()).await.unwrap();
        assert_eq!(report.candidates, 0);

        h.clock.advance(Duration::from_secs(1));
        let report = h.sweeper.expiry_pass(SweepOptions::periodic()).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.records_deleted, 1);
        assert_eq!(report.blobs_deleted, 1);
        assert_eq!(report.reclaimed, vec![record.code.clone()]);

        assert!(h.store.get(&record.code).await.unwrap().is_none());
        assert!(!h.blobs.exists(&record.storage_path).await.unwrap());
    }

    #[tokio::test]
    async fn force_reclaims_downloaded_records_only() {
        let h = Harness::new();
        let downloaded = h.upload_and_download("a.txt").await;
        let pending = h.upload("b.txt", b"b").await;

        let normal = h.sweeper.expiry_pass(SweepOptions::periodic()).await.unwrap();
        assert_eq!(normal.candidates, 0);

        let forced = h.sweeper.expiry_pass(SweepOptions::manual(false, true)).await.unwrap();
        assert_eq!(forced.records_deleted, 1);
        assert!(h.store.get(&downloaded.code).await.unwrap().is_none());
        assert!(h.store.get(&pending.code).await.unwrap().is_some());
        assert!(h.blobs.exists(&pending.storage_path).await.unwrap());
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let h = Harness::new();
        let a = h.upload_and_download("a.txt").await;
        let b = h.upload_and_download("b.txt").await;
        h.blobs.delete(&b.storage_path).await.unwrap();
        h.clock.advance(Duration::from_secs(61));

        let before_records = h.store.count().await.unwrap();
        let before_blobs = h.blobs.list("uploads").await.unwrap().len();

        let preview = h.sweeper.expiry_pass(SweepOptions::manual(true, false)).await.unwrap();
        assert_eq!(h.store.count().await.unwrap(), before_records);
        assert_eq!(h.blobs.list("uploads").await.unwrap().len(), before_blobs);
        assert!(h.blobs.exists(&a.storage_path).await.unwrap());

        let live = h.sweeper.expiry_pass(SweepOptions::periodic()).await.unwrap();
        assert_eq!(preview.candidates, live.candidates);
        assert_eq!(preview.records_deleted, live.records_deleted);
        assert_eq!(preview.blobs_deleted, live.blobs_deleted);
        assert_eq!(preview.blobs_missing, live.blobs_missing);
    }

    #[tokio::test]
    async fn absent_blob_still_removes_record() {
        let h = Harness::new();
        let record = h.upload_and_download("a.txt").await;
        h.blobs.delete(&record.storage_path).await.unwrap();
        h.clock.advance(Duration::from_secs(61));

        let report = h.sweeper.expiry_pass(SweepOptions::periodic()).await.unwrap();
        assert_eq!(report.blobs_missing, 1);
        assert_eq!(report.records_deleted, 1);
        assert!(report.errors.is_empty());
        assert!(h.store.get(&record.code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blob_delete_failure_keeps_record_and_continues() {
        let h = Harness::new();
        let a = h.upload_and_download("a.txt").await;
        let b = h.upload_and_download("b.txt").await;
        h.clock.advance(Duration::from_secs(61));
        h.blobs.fail_deletes.store(true, Ordering::SeqCst);

        let report = h.sweeper.expiry_pass(SweepOptions::periodic()).await.unwrap();
        assert_eq!(report.candidates, 2);
        assert_eq!(report.records_deleted, 0);
        assert_eq!(report.errors.total(), 2);
        assert!(h.store.get(&a.code).await.unwrap().is_some());
        assert!(h.store.get(&b.code).await.unwrap().is_some());

        // The next pass picks them up once storage recovers.
        h.blobs.fail_deletes.store(false, Ordering::SeqCst);
        let report = h.sweeper.expiry_pass(SweepOptions::periodic()).await.unwrap();
        assert_eq!(report.records_deleted, 2);
    }

    #[tokio::test]
    async fn error_collection_is_bounded() {
        let h = Harness::new();
        let total = MAX_REPORTED_ERRORS + 3;
        for i in 0..total {
            h.upload_and_download(&format!("f{i}.txt")).await;
        }
        h.clock.advance(Duration::from_secs(61));
        h.blobs.fail_deletes.store(true, Ordering::SeqCst);

        let report = h.sweeper.expiry_pass(SweepOptions::periodic()).await.unwrap();
        assert_eq!(report.candidates, total as u64);
        assert_eq!(report.errors.messages.len(), MAX_REPORTED_ERRORS);
        assert_eq!(report.errors.truncated, 3);
    }
}
