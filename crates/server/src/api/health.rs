use axum::Json;
use axum::extract::State;
use chrono::Utc;

use super::AppState;
use super::schemas::{HealthResponse, MetricsResponse};

/// Version reported by the health endpoint.
pub const API_VERSION: &str = "1.0.0";

/// `GET /health` -- service status with a metrics snapshot.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        timestamp: Utc::now(),
        version: API_VERSION.into(),
        metrics: state.services.metrics.snapshot().into(),
    })
}

/// `GET /metrics` -- lifecycle and cleanup counters.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    summary = "Metrics",
    responses(
        (status = 200, description = "Current counters", body = MetricsResponse)
    )
)]
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(state.services.metrics.snapshot().into())
}
