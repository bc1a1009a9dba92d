use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use ferry_core::FileRecord;
use ferry_store::error::StoreError;
use ferry_store::store::MetadataStore;

use crate::config::PostgresConfig;
use crate::migrations;

const COLUMNS: &str = "code, original_filename, file_size, content_type, storage_path, \
     is_downloaded, download_count, downloaded_at, created_at, expires_at, download_token";

/// Build `PgConnectOptions` from a [`PostgresConfig`], applying SSL settings
/// when configured.
fn build_connect_options(
    config: &PostgresConfig,
) -> Result<sqlx::postgres::PgConnectOptions, StoreError> {
    let mut options: sqlx::postgres::PgConnectOptions = config
        .url
        .parse()
        .map_err(|e: sqlx::Error| StoreError::Connection(e.to_string()))?;

    if let Some(ref mode) = config.ssl_mode {
        let ssl_mode = match mode.as_str() {
            "disable" => sqlx::postgres::PgSslMode::Disable,
            "prefer" => sqlx::postgres::PgSslMode::Prefer,
            "require" => sqlx::postgres::PgSslMode::Require,
            "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
            "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
            other => {
                return Err(StoreError::Connection(format!("unknown ssl_mode: {other}")));
            }
        };
        options = options.ssl_mode(ssl_mode);
    }

    if let Some(ref path) = config.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }
    if let Some(ref path) = config.ssl_cert {
        options = options.ssl_client_cert(path);
    }
    if let Some(ref path) = config.ssl_key {
        options = options.ssl_client_key(path);
    }

    Ok(options)
}

/// Open a connection pool without running migrations.
///
/// # Errors
///
/// Returns [`StoreError::Connection`] if the URL is invalid or the database
/// is unreachable.
pub async fn connect(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let connect_options = build_connect_options(config)?;
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect_with(connect_options)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))
}

fn query_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(e.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn decode_error(e: sqlx::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

fn record_from_row(row: &PgRow) -> Result<FileRecord, StoreError> {
    let file_size: i64 = row.try_get("file_size").map_err(decode_error)?;
    let download_count: i64 = row.try_get("download_count").map_err(decode_error)?;

    Ok(FileRecord {
        code: row.try_get("code").map_err(decode_error)?,
        original_filename: row.try_get("original_filename").map_err(decode_error)?,
        file_size: u64::try_from(file_size)
            .map_err(|_| StoreError::Serialization(format!("negative file_size {file_size}")))?,
        content_type: row.try_get("content_type").map_err(decode_error)?,
        storage_path: row.try_get("storage_path").map_err(decode_error)?,
        is_downloaded: row.try_get("is_downloaded").map_err(decode_error)?,
        download_count: u64::try_from(download_count).map_err(|_| {
            StoreError::Serialization(format!("negative download_count {download_count}"))
        })?,
        downloaded_at: row.try_get("downloaded_at").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        expires_at: row.try_get("expires_at").map_err(decode_error)?,
        download_token: row.try_get("download_token").map_err(decode_error)?,
    })
}

fn records_from_rows(rows: &[PgRow]) -> Result<Vec<FileRecord>, StoreError> {
    rows.iter().map(record_from_row).collect()
}

/// PostgreSQL-backed implementation of [`MetadataStore`].
///
/// Conditional transitions are single `UPDATE ... WHERE ... RETURNING`
/// statements, so the row lock taken by the update serialises racing callers
/// and the losers see zero rows.
pub struct PostgresMetadataStore {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresMetadataStore {
    /// Connect to `PostgreSQL` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if pool creation fails, or
    /// [`StoreError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        let pool = connect(&config).await?;
        Self::from_pool(pool, config).await
    }

    /// Connect to `PostgreSQL` without touching the schema.
    ///
    /// Queries fail if the records table has not been migrated yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if pool creation fails.
    pub async fn connect_existing(config: PostgresConfig) -> Result<Self, StoreError> {
        let pool = connect(&config).await?;
        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    /// Create a store from an existing pool. Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(table = %config.records_table(), "postgres metadata store ready");
        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn insert(&self, record: &FileRecord) -> Result<bool, StoreError> {
        let table = self.config.records_table();
        let file_size = i64::try_from(record.file_size)
            .map_err(|_| StoreError::Serialization("file_size out of range".into()))?;
        let download_count = i64::try_from(record.download_count)
            .map_err(|_| StoreError::Serialization("download_count out of range".into()))?;

        let query = format!(
            "INSERT INTO {table} ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (code) DO NOTHING"
        );

        let result = sqlx::query(&query)
            .bind(&record.code)
            .bind(&record.original_filename)
            .bind(file_size)
            .bind(&record.content_type)
            .bind(&record.storage_path)
            .bind(record.is_downloaded)
            .bind(download_count)
            .bind(record.downloaded_at)
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(record.download_token.as_deref())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let table = self.config.records_table();
        let query = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE code = $1)");

        let (exists,): (bool,) = sqlx::query_as(&query)
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(exists)
    }

    async fn get(&self, code: &str) -> Result<Option<FileRecord>, StoreError> {
        let table = self.config.records_table();
        let query = format!("SELECT {COLUMNS} FROM {table} WHERE code = $1");

        let row = sqlx::query(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn get_by_token(
        &self,
        code: &str,
        token: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        if token.is_empty() {
            return Ok(None);
        }
        let table = self.config.records_table();
        let query =
            format!("SELECT {COLUMNS} FROM {table} WHERE code = $1 AND download_token = $2");

        let row = sqlx::query(&query)
            .bind(code)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn assign_token(
        &self,
        code: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, StoreError> {
        let table = self.config.records_table();
        let query = format!(
            "UPDATE {table} SET download_token = $2 \
             WHERE code = $1 AND NOT is_downloaded \
               AND (expires_at IS NULL OR expires_at >= $3) \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(code)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn mark_downloaded(
        &self,
        code: &str,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, StoreError> {
        if token.is_empty() {
            return Ok(None);
        }
        let table = self.config.records_table();
        let query = format!(
            "UPDATE {table} SET is_downloaded = TRUE, \
                 download_count = download_count + 1, \
                 downloaded_at = $3, \
                 expires_at = $4 \
             WHERE code = $1 AND download_token = $2 AND NOT is_downloaded \
               AND (expires_at IS NULL OR expires_at >= $3) \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(code)
            .bind(token)
            .bind(now)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn delete(&self, code: &str) -> Result<bool, StoreError> {
        let table = self.config.records_table();
        let query = format!("DELETE FROM {table} WHERE code = $1");

        let result = sqlx::query(&query)
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError> {
        let table = self.config.records_table();
        let query = format!(
            "SELECT {COLUMNS} FROM {table} \
             WHERE expires_at IS NOT NULL AND expires_at < $1 \
             ORDER BY expires_at"
        );

        let rows = sqlx::query(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        records_from_rows(&rows)
    }

    async fn list_downloaded(&self) -> Result<Vec<FileRecord>, StoreError> {
        let table = self.config.records_table();
        let query = format!("SELECT {COLUMNS} FROM {table} WHERE is_downloaded ORDER BY code");

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        records_from_rows(&rows)
    }

    async fn storage_paths(&self) -> Result<HashSet<String>, StoreError> {
        let table = self.config.records_table();
        let query = format!("SELECT storage_path FROM {table}");

        let rows: Vec<(String,)> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(rows.into_iter().map(|(path,)| path).collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let table = self.config.records_table();
        let query = format!("SELECT COUNT(*) FROM {table}");

        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        u64::try_from(count).map_err(|_| StoreError::Serialization(format!("bad count {count}")))
    }
}
