use chrono::{DateTime, Duration, TimeZone, Utc};
use ferry_core::FileRecord;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::MetadataStore;

fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Codes are unique per call so the suite can run against a shared database.
fn unique_code(tag: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{tag}{}", &id[..10])
}

fn test_record(code: &str) -> FileRecord {
    FileRecord::new(
        code,
        "report.pdf",
        42,
        Some("application/pdf"),
        format!("uploads/20231114_221320_000000_{code}.pdf"),
        base_time(),
    )
}

/// Run the full metadata store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_store_conformance_tests(store: &dyn MetadataStore) -> Result<(), StoreError> {
    test_get_missing(store).await?;
    test_insert_and_get(store).await?;
    test_insert_collision(store).await?;
    test_assign_token(store).await?;
    test_assign_token_missing(store).await?;
    test_never_tokened_record(store).await?;
    test_mark_downloaded(store).await?;
    test_unavailable_after_expiry(store).await?;
    test_delete(store).await?;
    test_list_expired(store).await?;
    test_list_downloaded(store).await?;
    test_storage_paths(store).await?;
    test_count(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let code = unique_code("missing");
    assert!(store.get(&code).await?.is_none(), "get on missing code should return None");
    assert!(!store.code_exists(&code).await?);
    Ok(())
}

async fn test_insert_and_get(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let record = test_record(&unique_code("ins"));
    assert!(store.insert(&record).await?, "insert of a new code should succeed");
    assert!(store.code_exists(&record.code).await?);

    let loaded = store.get(&record.code).await?;
    assert_eq!(loaded.as_ref(), Some(&record), "stored record should read back unchanged");
    Ok(())
}

async fn test_insert_collision(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let code = unique_code("dup");
    let first = test_record(&code);
    assert!(store.insert(&first).await?);

    let mut second = test_record(&code);
    second.original_filename = "other.txt".into();
    assert!(!store.insert(&second).await?, "insert on an existing code should return false");

    let loaded = store.get(&code).await?;
    assert_eq!(
        loaded.map(|r| r.original_filename).as_deref(),
        Some("report.pdf"),
        "original record should remain"
    );
    Ok(())
}

async fn test_assign_token(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let record = test_record(&unique_code("tok"));
    store.insert(&record).await?;
    let now = base_time() + Duration::seconds(1);

    let updated = store.assign_token(&record.code, "token-a", now).await?;
    assert_eq!(
        updated.and_then(|r| r.download_token).as_deref(),
        Some("token-a")
    );

    // Re-issuing replaces the previous token.
    store.assign_token(&record.code, "token-b", now).await?;
    assert!(store.get_by_token(&record.code, "token-a").await?.is_none());
    let by_token = store.get_by_token(&record.code, "token-b").await?;
    assert_eq!(by_token.map(|r| r.code), Some(record.code.clone()));

    assert!(
        store.get_by_token(&record.code, "").await?.is_none(),
        "empty token should never match"
    );
    Ok(())
}

async fn test_assign_token_missing(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let code = unique_code("notok");
    let result = store.assign_token(&code, "token", base_time()).await?;
    assert!(result.is_none(), "assign_token on missing code should return None");
    Ok(())
}

async fn test_never_tokened_record(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let record = test_record(&unique_code("fresh"));
    store.insert(&record).await?;
    let now = base_time() + Duration::seconds(1);
    let guess = "0".repeat(64);

    assert!(
        store.get_by_token(&record.code, &guess).await?.is_none(),
        "a record without a token matches no token"
    );
    assert!(
        store
            .mark_downloaded(&record.code, &guess, now, now + Duration::seconds(60))
            .await?
            .is_none(),
        "a record without a token cannot be downloaded"
    );

    let stored = store
        .get(&record.code)
        .await?
        .ok_or_else(|| StoreError::Backend("record should still exist".into()))?;
    assert!(!stored.is_downloaded);
    assert!(stored.download_token.is_none());
    Ok(())
}

async fn test_mark_downloaded(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let record = test_record(&unique_code("dl"));
    store.insert(&record).await?;
    let now = base_time() + Duration::seconds(10);
    let expires = now + Duration::seconds(60);
    store.assign_token(&record.code, "tok", now).await?;

    let wrong = store.mark_downloaded(&record.code, "nope", now, expires).await?;
    assert!(wrong.is_none(), "wrong token must not transition the record");

    let updated = store
        .mark_downloaded(&record.code, "tok", now, expires)
        .await?
        .ok_or_else(|| StoreError::Backend("mark_downloaded should succeed".into()))?;
    assert!(updated.is_downloaded);
    assert_eq!(updated.download_count, 1);
    assert_eq!(updated.downloaded_at, Some(now));
    assert_eq!(updated.expires_at, Some(expires));

    let again = store.mark_downloaded(&record.code, "tok", now, expires).await?;
    assert!(again.is_none(), "a token can be consumed only once");

    let refreshed = store.assign_token(&record.code, "tok2", now).await?;
    assert!(refreshed.is_none(), "downloaded records must not receive new tokens");
    Ok(())
}

async fn test_unavailable_after_expiry(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let mut record = test_record(&unique_code("exp"));
    // Not downloaded but carrying an expiry: the predicate still applies.
    record.expires_at = Some(base_time() + Duration::seconds(5));
    record.download_token = Some("tok".into());
    store.insert(&record).await?;

    let later = base_time() + Duration::seconds(6);
    assert!(store.assign_token(&record.code, "tok2", later).await?.is_none());
    let consumed = store
        .mark_downloaded(&record.code, "tok", later, later + Duration::seconds(60))
        .await?;
    assert!(consumed.is_none(), "expired records must not be consumable");

    // Exactly at expiry the record is still available.
    let at_expiry = base_time() + Duration::seconds(5);
    assert!(store.assign_token(&record.code, "tok3", at_expiry).await?.is_some());
    Ok(())
}

async fn test_delete(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let record = test_record(&unique_code("del"));
    store.insert(&record).await?;

    assert!(store.delete(&record.code).await?, "delete should return true for existing record");
    assert!(store.get(&record.code).await?.is_none(), "get after delete should return None");
    assert!(!store.delete(&record.code).await?, "delete on missing record should return false");
    Ok(())
}

async fn test_list_expired(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let downloaded = test_record(&unique_code("lexp"));
    let pending = test_record(&unique_code("lpend"));
    store.insert(&downloaded).await?;
    store.insert(&pending).await?;

    let now = base_time() + Duration::seconds(100);
    let expires = now + Duration::seconds(60);
    store.assign_token(&downloaded.code, "tok", now).await?;
    store.mark_downloaded(&downloaded.code, "tok", now, expires).await?;

    let at_expiry = store.list_expired(expires).await?;
    assert!(
        !at_expiry.iter().any(|r| r.code == downloaded.code),
        "expiry comparison must be strict"
    );

    let after = store.list_expired(expires + Duration::seconds(1)).await?;
    assert!(after.iter().any(|r| r.code == downloaded.code));
    assert!(
        !after.iter().any(|r| r.code == pending.code),
        "records without an expiry are never expired"
    );
    Ok(())
}

async fn test_list_downloaded(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let downloaded = test_record(&unique_code("ldl"));
    let pending = test_record(&unique_code("lnodl"));
    store.insert(&downloaded).await?;
    store.insert(&pending).await?;

    let now = base_time() + Duration::seconds(200);
    store.assign_token(&downloaded.code, "tok", now).await?;
    store
        .mark_downloaded(&downloaded.code, "tok", now, now + Duration::days(365))
        .await?;

    let listed = store.list_downloaded().await?;
    assert!(listed.iter().any(|r| r.code == downloaded.code));
    assert!(!listed.iter().any(|r| r.code == pending.code));
    Ok(())
}

async fn test_storage_paths(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let record = test_record(&unique_code("path"));
    store.insert(&record).await?;

    let paths = store.storage_paths().await?;
    assert!(paths.contains(&record.storage_path));

    store.delete(&record.code).await?;
    let paths = store.storage_paths().await?;
    assert!(!paths.contains(&record.storage_path));
    Ok(())
}

async fn test_count(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let before = store.count().await?;
    let record = test_record(&unique_code("cnt"));
    store.insert(&record).await?;
    assert_eq!(store.count().await?, before + 1);

    store.delete(&record.code).await?;
    assert_eq!(store.count().await?, before);
    Ok(())
}
