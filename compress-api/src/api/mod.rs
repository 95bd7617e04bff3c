//! HTTP surface of the compression service.

use utoipa::OpenApi;

/// Request handlers.
pub mod handlers;
/// Request and response models.
pub mod models;
/// Response construction with CORS.
pub mod reply;
/// Route definitions.
pub mod routes;

/// OpenAPI description of the service.
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        // Compression endpoints.
        handlers::compress::compress,
        handlers::compress::preflight,
        // Health check endpoints.
        handlers::health::get_health,
    ),
    components(schemas(
        models::compress::CompressForm,
        models::health::HealthData,
        crate::common::error::ErrorResponse,
    )),
    tags(
        (name = "compress", description = "Batch image compression"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// The OpenAPI document as pretty printed JSON.
    pub fn to_pretty_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
