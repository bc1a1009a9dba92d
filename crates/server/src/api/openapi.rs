#![allow(clippy::needless_for_each)]

use super::schemas::{
    ErrorResponse, FileInfoResponse, HealthResponse, MetricsResponse, UploadForm, UploadResponse,
};

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Ferry API",
        version = "1.0.0",
        description = "Ephemeral file sharing. Upload a file, hand out its code, and let the recipient download it exactly once.",
        license(name = "Apache-2.0")
    ),
    tags(
        (name = "Files", description = "Upload, lookup and single-use download"),
        (name = "Health", description = "Service health and metrics")
    ),
    paths(
        super::upload::upload,
        super::files::file_info,
        super::download::download,
        super::download::head,
        super::health::health,
        super::health::metrics,
    ),
    components(schemas(
        ErrorResponse,
        UploadForm,
        UploadResponse,
        FileInfoResponse,
        HealthResponse,
        MetricsResponse,
    ))
)]
pub struct ApiDoc;
