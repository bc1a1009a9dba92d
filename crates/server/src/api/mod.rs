pub mod download;
pub mod files;
pub mod health;
pub mod openapi;
pub mod schemas;
pub mod upload;

use axum::Json;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::services::Services;

use self::openapi::ApiDoc;

/// Multipart framing allowance on top of the largest accepted file.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    let max_upload = state.services.engine.config().max_upload_bytes;
    let body_limit = usize::try_from(max_upload)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);

    // Only the file routes give the inline cleanup a chance to run. Probes
    // and docs stay free of side effects.
    let file_routes = Router::new()
        .route("/upload", post(upload::upload))
        .route("/file/{code}", get(files::file_info))
        .route(
            "/download/{code}/{token}",
            get(download::download).head(download::head),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), inline_cleanup));

    Router::new()
        .merge(file_routes)
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/api-doc/openapi.json", get(openapi_json))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Give the inline cleanup a chance to start before a file request.
///
/// HEAD requests are read-only checks and never trigger. Never blocks: the
/// sweep, if any, runs on its own task.
async fn inline_cleanup(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() != Method::HEAD {
        state.services.inline.maybe_trigger();
    }
    next.run(request).await
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
