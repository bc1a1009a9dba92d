use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use ferry_engine::{FileInfo, MetricsSnapshot};

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    #[schema(example = "File not found")]
    pub error: String,
}

/// Multipart form accepted by the upload endpoint.
#[derive(Debug, ToSchema)]
pub struct UploadForm {
    /// The file to share.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Response to a successful upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Share code used to look the file up.
    #[schema(example = "K7Q2M9XD")]
    pub code: String,
    /// Original filename.
    #[schema(example = "report.pdf")]
    pub filename: String,
    /// Size in bytes.
    #[schema(example = 48213)]
    pub size: u64,
    #[schema(example = "File uploaded successfully")]
    pub message: String,
}

/// File details plus a freshly issued download token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileInfoResponse {
    pub filename: String,
    pub size: u64,
    #[schema(example = "application/pdf")]
    pub content_type: String,
    /// Single-use token for `/download/{code}/{token}`. Each lookup replaces
    /// the previous one.
    pub download_token: String,
    pub created_at: DateTime<Utc>,
}

impl From<FileInfo> for FileInfoResponse {
    fn from(info: FileInfo) -> Self {
        Self {
            filename: info.filename,
            size: info.size,
            content_type: info.content_type,
            download_token: info.download_token,
            created_at: info.created_at,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status indicator.
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "1.0.0")]
    pub version: String,
    /// Current lifecycle and cleanup counters.
    pub metrics: MetricsResponse,
}

/// Lifecycle and cleanup counters since startup.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    /// Files uploaded.
    pub uploads: u64,
    /// Download tokens issued.
    pub tokens_issued: u64,
    /// Downloads completed.
    pub downloads: u64,
    /// Sweeps that ran to completion (dry runs excluded).
    pub sweeps_run: u64,
    /// Sweeps aborted by a store or listing failure.
    pub sweep_failures: u64,
    /// Expired records reclaimed.
    pub records_reaped: u64,
    /// Orphaned blobs removed.
    pub orphans_removed: u64,
    /// Per-item failures inside sweeps.
    pub sweep_errors: u64,
    /// Inline triggers skipped by the cooldown or an in-flight sweep.
    pub inline_skipped: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(snap: MetricsSnapshot) -> Self {
        Self {
            uploads: snap.uploads,
            tokens_issued: snap.tokens_issued,
            downloads: snap.downloads,
            sweeps_run: snap.sweeps_run,
            sweep_failures: snap.sweep_failures,
            records_reaped: snap.records_reaped,
            orphans_removed: snap.orphans_removed,
            sweep_errors: snap.sweep_errors,
            inline_skipped: snap.inline_skipped,
        }
    }
}
