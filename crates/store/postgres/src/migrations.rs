use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Run database migrations, creating the records table and its indexes if
/// they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let table = config.records_table();
    let expires_idx = config.index_name("expires_at");
    let path_idx = config.index_name("storage_path");
    let downloaded_idx = config.index_name("is_downloaded");

    let create_table = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            code TEXT PRIMARY KEY,
            original_filename TEXT NOT NULL,
            file_size BIGINT NOT NULL,
            content_type TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            is_downloaded BOOLEAN NOT NULL DEFAULT FALSE,
            download_count BIGINT NOT NULL DEFAULT 0,
            downloaded_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            expires_at TIMESTAMPTZ,
            download_token TEXT
        )"
    );

    let create_expires_idx = format!(
        "CREATE INDEX IF NOT EXISTS {expires_idx} ON {table} (expires_at) \
         WHERE expires_at IS NOT NULL"
    );
    let create_path_idx =
        format!("CREATE INDEX IF NOT EXISTS {path_idx} ON {table} (storage_path)");
    let create_downloaded_idx = format!(
        "CREATE INDEX IF NOT EXISTS {downloaded_idx} ON {table} (is_downloaded) \
         WHERE is_downloaded"
    );

    sqlx::query(&create_table).execute(pool).await?;
    sqlx::query(&create_expires_idx).execute(pool).await?;
    sqlx::query(&create_path_idx).execute(pool).await?;
    sqlx::query(&create_downloaded_idx).execute(pool).await?;

    Ok(())
}
