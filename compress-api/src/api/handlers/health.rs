//! Handlers for Health endpoint endpoints.

use warp::http::StatusCode;

use crate::api::models::health::HealthData;
use crate::context::ApiContext;

/// Get health handler.
#[utoipa::path(
    get,
    operation_id = "checkHealth",
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Successfully retrieved health data.", body = HealthData),
        (status = 405, description = "Method not allowed", body = ErrorResponse),
    )
)]
pub async fn get_health(context: ApiContext) -> impl warp::reply::Reply {
    context.reply().json(StatusCode::OK, &HealthData::current())
}
