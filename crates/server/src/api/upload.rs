use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use tracing::debug;

use ferry_engine::NewUpload;

use crate::error::ServerError;

use super::AppState;
use super::schemas::{ErrorResponse, UploadForm, UploadResponse};

const NO_FILE: &str = "No file provided";

/// `POST /upload` -- store a file and return its share code.
///
/// Expects a `multipart/form-data` body with the file in a field named
/// `file`. Other fields are ignored.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Files",
    summary = "Upload a file",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing file or file too large", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ServerError> {
    let mut multipart = multipart.map_err(|e| {
        debug!(error = %e, "not a multipart request");
        ServerError::BadRequest(NO_FILE.into())
    })?;
    let limit = state.services.engine.config().max_upload_bytes;

    let upload = loop {
        let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&e, limit))?
        else {
            return Err(ServerError::BadRequest(NO_FILE.into()));
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_owned();
        if filename.trim().is_empty() {
            return Err(ServerError::BadRequest(NO_FILE.into()));
        }
        let content_type = field.content_type().map(str::to_owned);
        let data = field.bytes().await.map_err(|e| multipart_error(&e, limit))?;

        break NewUpload {
            filename,
            content_type,
            data,
        };
    };

    let record = state.services.engine.create_record(upload).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            code: record.code,
            filename: record.original_filename,
            size: record.file_size,
            message: "File uploaded successfully".into(),
        }),
    ))
}

/// Oversized bodies surface as multipart errors once the body limit trips.
fn multipart_error(e: &MultipartError, limit: u64) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::BadRequest(size_limit_message(limit))
    } else {
        debug!(error = %e, "malformed multipart body");
        ServerError::BadRequest(NO_FILE.into())
    }
}

pub(crate) fn size_limit_message(limit: u64) -> String {
    format!("File size exceeds {}MB limit", limit / (1024 * 1024))
}
