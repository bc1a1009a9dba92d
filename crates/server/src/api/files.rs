use axum::Json;
use axum::extract::{Path, State};

use crate::error::ServerError;

use super::AppState;
use super::schemas::{ErrorResponse, FileInfoResponse};

/// `GET /file/{code}` -- file details and a fresh download token.
///
/// Every call rotates the token; only the most recent one downloads.
#[utoipa::path(
    get,
    path = "/file/{code}",
    tag = "Files",
    summary = "Look up a file",
    params(("code" = String, Path, description = "Share code")),
    responses(
        (status = 200, description = "File is available", body = FileInfoResponse),
        (status = 404, description = "Unknown code", body = ErrorResponse),
        (status = 410, description = "Already downloaded or expired", body = ErrorResponse)
    )
)]
pub async fn file_info(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<FileInfoResponse>, ServerError> {
    let info = state.services.engine.issue_token(&code).await?;
    Ok(Json(info.into()))
}
