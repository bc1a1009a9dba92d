use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type used when the uploader did not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata for a single shared file.
///
/// A record is created on upload, has its `download_token` rotated on every
/// info lookup, and is flipped to downloaded exactly once. After that it only
/// waits for the sweeper to reclaim it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Short public identifier. Unique across all live records.
    pub code: String,
    /// Filename as sent by the uploader.
    pub original_filename: String,
    /// Size of the blob in bytes.
    pub file_size: u64,
    /// MIME type reported at upload time.
    pub content_type: String,
    /// Blob location relative to the blob store root. Never exposed to callers.
    pub storage_path: String,
    /// Whether the file has been retrieved.
    pub is_downloaded: bool,
    /// Number of completed retrievals.
    pub download_count: u64,
    /// When the first retrieval completed.
    pub downloaded_at: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record becomes eligible for reclamation. `None` until download.
    pub expires_at: Option<DateTime<Utc>>,
    /// The most recently issued download token.
    pub download_token: Option<String>,
}

impl FileRecord {
    /// Build a fresh, never-downloaded record.
    pub fn new(
        code: impl Into<String>,
        original_filename: impl Into<String>,
        file_size: u64,
        content_type: Option<&str>,
        storage_path: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        Self {
            code: code.into(),
            original_filename: original_filename.into(),
            file_size,
            content_type: content_type.to_owned(),
            storage_path: storage_path.into(),
            is_downloaded: false,
            download_count: 0,
            downloaded_at: None,
            created_at,
            expires_at: None,
            download_token: None,
        }
    }

    /// Returns `true` once `expires_at` lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }

    /// A record is available iff it was never downloaded and has not expired.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_downloaded && !self.is_expired_at(now)
    }

    /// Apply the download transition in place.
    ///
    /// `expires_at` is always exactly `now + retention`.
    pub fn mark_downloaded(&mut self, now: DateTime<Utc>, retention: Duration) {
        self.is_downloaded = true;
        self.download_count += 1;
        self.downloaded_at = Some(now);
        self.expires_at = Some(expiry_after(now, retention));
    }
}

/// Compute the expiry instant for a download completed at `downloaded_at`.
pub fn expiry_after(downloaded_at: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    // Retention windows are configured in seconds; anything beyond chrono's
    // range is clamped to the far future.
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|window| downloaded_at.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record() -> FileRecord {
        FileRecord::new("Ab3dE6gH", "a.txt", 10, Some("text/plain"), "uploads/x_a.txt", at(0))
    }

    #[test]
    fn new_record_is_available_without_expiry() {
        let rec = record();
        assert!(rec.is_available_at(at(10_000_000)));
        assert!(rec.expires_at.is_none());
        assert!(rec.download_token.is_none());
        assert_eq!(rec.download_count, 0);
    }

    #[test]
    fn missing_content_type_falls_back_to_octet_stream() {
        let rec = FileRecord::new("c", "f.bin", 1, None, "uploads/f.bin", at(0));
        assert_eq!(rec.content_type, DEFAULT_CONTENT_TYPE);

        let rec = FileRecord::new("c", "f.bin", 1, Some("  "), "uploads/f.bin", at(0));
        assert_eq!(rec.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn mark_downloaded_sets_exact_expiry() {
        let mut rec = record();
        rec.mark_downloaded(at(5), Duration::from_secs(60));

        assert!(rec.is_downloaded);
        assert_eq!(rec.download_count, 1);
        assert_eq!(rec.downloaded_at, Some(at(5)));
        assert_eq!(rec.expires_at, Some(at(65)));
    }

    #[test]
    fn downloaded_record_is_unavailable_before_expiry() {
        let mut rec = record();
        rec.mark_downloaded(at(5), Duration::from_secs(60));

        assert!(!rec.is_expired_at(at(6)));
        assert!(!rec.is_available_at(at(6)));
    }

    #[test]
    fn expiry_is_strict() {
        let mut rec = record();
        rec.expires_at = Some(at(60));

        assert!(!rec.is_expired_at(at(60)));
        assert!(rec.is_expired_at(at(61)));
        assert!(!rec.is_available_at(at(61)));
    }

    #[test]
    fn download_count_keeps_counting() {
        let mut rec = record();
        rec.mark_downloaded(at(1), Duration::from_secs(60));
        rec.mark_downloaded(at(2), Duration::from_secs(60));
        assert_eq!(rec.download_count, 2);
        assert_eq!(rec.expires_at, Some(at(62)));
    }
}
