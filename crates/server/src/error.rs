use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use ferry_engine::LifecycleError;

use crate::api::schemas::ErrorResponse;

/// Errors that can occur when running the Ferry server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The request itself was malformed. The message is returned verbatim.
    #[error("{0}")]
    BadRequest(String),

    /// A lookup failed in a way that gets a route-specific message.
    #[error("{0}")]
    NotFound(&'static str),

    /// A lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, (*msg).to_owned()),
            Self::Lifecycle(e) => match e {
                LifecycleError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                LifecycleError::NotFound => (StatusCode::NOT_FOUND, "File not found".into()),
                LifecycleError::Gone => (StatusCode::GONE, "File no longer available".into()),
                LifecycleError::BlobMissing => {
                    (StatusCode::NOT_FOUND, "File not found on server".into())
                }
                _ => internal(),
            },
            Self::Config(_) | Self::Io(_) => internal(),
        }
    }
}

fn internal() -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use ferry_blob::BlobError;

    use super::*;

    #[test]
    fn lifecycle_errors_map_to_client_statuses() {
        let cases = [
            (LifecycleError::NotFound, StatusCode::NOT_FOUND, "File not found"),
            (LifecycleError::Gone, StatusCode::GONE, "File no longer available"),
            (
                LifecycleError::BlobMissing,
                StatusCode::NOT_FOUND,
                "File not found on server",
            ),
            (
                LifecycleError::Validation("No file provided".into()),
                StatusCode::BAD_REQUEST,
                "No file provided",
            ),
        ];
        for (err, status, message) in cases {
            let (s, m) = ServerError::from(err).status_and_message();
            assert_eq!(s, status);
            assert_eq!(m, message);
        }
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = ServerError::from(LifecycleError::StorageWrite(BlobError::Validation(
            "/srv/media/uploads is read-only".into(),
        )));
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("/srv"));
    }
}
