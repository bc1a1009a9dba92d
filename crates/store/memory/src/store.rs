use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use subtle::ConstantTimeEq;

use ferry_core::FileRecord;
use ferry_store::error::StoreError;
use ferry_store::store::MetadataStore;

/// Constant-time comparison of the presented token against the stored one.
fn token_matches(record: &FileRecord, token: &str) -> bool {
    match record.download_token.as_deref() {
        Some(current) if !token.is_empty() => current.as_bytes().ct_eq(token.as_bytes()).into(),
        _ => false,
    }
}

/// In-memory [`MetadataStore`] backed by a [`DashMap`].
///
/// Conditional updates run under the shard write lock of the affected entry,
/// so the check and the mutation are atomic with respect to other callers.
/// Records are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: DashMap<String, FileRecord>,
}

impl MemoryMetadataStore {
    /// Create a new, empty in-memory metadata store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert(&self, record: &FileRecord) -> Result<bool, StoreError> {
        match self.records.entry(record.code.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(code))
    }

    async fn get(&self, code: &str) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.records.get(code).map(|r| r.value().clone()))
    }

    async fn get_by_token(
        &self,
        code: &str,
        token: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        Ok(self
            .records
            .get(code)
            .filter(|r| token_matches(r, token))
            .map(|r| r.value().clone()))
    }

    async fn assign_token(
        &self,
        code: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, StoreError> {
        let Some(mut record) = self.records.get_mut(code) else {
            return Ok(None);
        };
        if !record.is_available_at(now) {
            return Ok(None);
        }
        record.download_token = Some(token.to_owned());
        Ok(Some(record.clone()))
    }

    async fn mark_downloaded(
        &self,
        code: &str,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, StoreError> {
        let Some(mut record) = self.records.get_mut(code) else {
            return Ok(None);
        };
        if !token_matches(&record, token) || !record.is_available_at(now) {
            return Ok(None);
        }
        record.is_downloaded = true;
        record.download_count += 1;
        record.downloaded_at = Some(now);
        record.expires_at = Some(expires_at);
        Ok(Some(record.clone()))
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(code).is_some())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.is_expired_at(now))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn list_downloaded(&self) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.is_downloaded)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn storage_paths(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .records
            .iter()
            .map(|r| r.storage_path.clone())
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use ferry_store::testing::run_store_conformance_tests;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn conformance() {
        let store = MemoryMetadataStore::new();
        run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_have_one_winner() {
        let store = Arc::new(MemoryMetadataStore::new());
        let record = FileRecord::new("race0001", "a.txt", 1, None, "uploads/a.txt", at(0));
        store.insert(&record).await.unwrap();
        store.assign_token("race0001", "tok", at(1)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .mark_downloaded("race0001", "tok", at(2), at(2) + Duration::seconds(60))
                    .await
                    .unwrap()
                    .is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.get("race0001").await.unwrap().unwrap().download_count, 1);
    }

    #[tokio::test]
    async fn record_without_token_never_matches() {
        let store = MemoryMetadataStore::new();
        let record = FileRecord::new("notoken1", "a.txt", 1, None, "uploads/a.txt", at(0));
        store.insert(&record).await.unwrap();

        assert!(store.get_by_token("notoken1", "").await.unwrap().is_none());
        assert!(
            store
                .mark_downloaded("notoken1", "", at(1), at(61))
                .await
                .unwrap()
                .is_none()
        );
    }
}
