use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_core::FileRecord;

use crate::error::StoreError;

/// Trait for persisting file records.
///
/// Every mutating method is a single atomic conditional operation on one
/// record: concurrent callers racing on the same code observe exactly one
/// winner. Implementations must be `Send + Sync` and safe for concurrent
/// access.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record unless one with the same code exists.
    /// Returns `true` if the record was stored, `false` on a code collision.
    async fn insert(&self, record: &FileRecord) -> Result<bool, StoreError>;

    /// Returns `true` if a record with this code exists.
    async fn code_exists(&self, code: &str) -> Result<bool, StoreError>;

    /// Look up a record by code.
    async fn get(&self, code: &str) -> Result<Option<FileRecord>, StoreError>;

    /// Look up a record by code whose current token equals `token`.
    async fn get_by_token(&self, code: &str, token: &str)
    -> Result<Option<FileRecord>, StoreError>;

    /// Replace the record's download token, but only while it is available
    /// at `now`. Returns the updated record, or `None` if the record is
    /// missing or no longer available.
    async fn assign_token(
        &self,
        code: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, StoreError>;

    /// Apply the download transition if `token` is current and the record
    /// is available at `now`: set the downloaded flag, increment the counter,
    /// and stamp `downloaded_at = now` and `expires_at`.
    ///
    /// Returns the updated record, or `None` if the condition did not hold.
    /// Of several concurrent callers presenting the same token, at most one
    /// receives `Some`.
    async fn mark_downloaded(
        &self,
        code: &str,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, StoreError>;

    /// Delete a record. Returns `true` if it existed.
    async fn delete(&self, code: &str) -> Result<bool, StoreError>;

    /// Records whose `expires_at` lies strictly before `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError>;

    /// Records that have been downloaded, regardless of expiry.
    async fn list_downloaded(&self) -> Result<Vec<FileRecord>, StoreError>;

    /// Every `storage_path` currently referenced by a record.
    async fn storage_paths(&self) -> Result<HashSet<String>, StoreError>;

    /// Number of records.
    async fn count(&self) -> Result<u64, StoreError>;
}
