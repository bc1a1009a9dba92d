use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::io::ReaderStream;
use tracing::warn;

use ferry_core::{FileRecord, effective_content_type};
use ferry_engine::LifecycleError;

use crate::error::ServerError;

use super::AppState;
use super::schemas::ErrorResponse;

/// RFC 5987 `attr-char` minus the alphanumerics.
const FILENAME_STAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// `GET /download/{code}/{token}` -- stream the file and consume the token.
///
/// A successful response means the single use is spent. A completed
/// download also nudges the inline cleanup so the record is reclaimed once
/// its retention window passes.
#[utoipa::path(
    get,
    path = "/download/{code}/{token}",
    tag = "Files",
    summary = "Download a file",
    params(
        ("code" = String, Path, description = "Share code"),
        ("token" = String, Path, description = "Download token from the info endpoint")
    ),
    responses(
        (status = 200, description = "File contents as an attachment"),
        (status = 404, description = "Invalid link or file missing from storage", body = ErrorResponse),
        (status = 410, description = "Already downloaded or expired", body = ErrorResponse)
    )
)]
pub async fn download(
    State(state): State<AppState>,
    Path((code, token)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let download = state
        .services
        .engine
        .consume_token(&code, &token)
        .await
        .map_err(link_error)?;

    state.services.inline.trigger_after_download();

    let mut headers = file_headers(&download.record, download.handle.size());
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(&download.record.original_filename),
    );

    let stream = ReaderStream::new(download.handle.into_reader());
    Ok((headers, Body::from_stream(stream)).into_response())
}

/// `HEAD /download/{code}/{token}` -- validate a link without consuming it.
#[utoipa::path(
    head,
    path = "/download/{code}/{token}",
    tag = "Files",
    summary = "Check a download link",
    params(
        ("code" = String, Path, description = "Share code"),
        ("token" = String, Path, description = "Download token from the info endpoint")
    ),
    responses(
        (status = 200, description = "Link is valid"),
        (status = 404, description = "Invalid link or file missing from storage"),
        (status = 410, description = "Already downloaded or expired")
    )
)]
pub async fn head(
    State(state): State<AppState>,
    Path((code, token)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let record = state
        .services
        .engine
        .inspect_download(&code, &token)
        .await
        .map_err(link_error)?;

    let mut headers = file_headers(&record, record.file_size);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    Ok(headers.into_response())
}

fn link_error(e: LifecycleError) -> ServerError {
    match e {
        LifecycleError::NotFound => ServerError::NotFound("Invalid download link"),
        other => other.into(),
    }
}

fn file_headers(record: &FileRecord, size: u64) -> HeaderMap {
    let content_type = effective_content_type(&record.content_type, &record.original_filename);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type).unwrap_or_else(|_| {
            warn!(content_type = %content_type, "unusable stored content type");
            HeaderValue::from_static("application/octet-stream")
        }),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers
}

/// `attachment` disposition with an ASCII fallback and the exact UTF-8 name.
pub(crate) fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(filename, FILENAME_STAR);
    let value = format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}");
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
