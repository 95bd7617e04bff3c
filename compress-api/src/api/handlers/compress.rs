//! Handlers for the compression endpoint.

use tracing::{debug, instrument};
use warp::multipart::FormData;

use crate::context::ApiContext;
use crate::intake;
use crate::pipeline::RequestPipeline;

/// Compress a batch of images handler.
#[utoipa::path(
    post,
    operation_id = "compressImages",
    path = "/api/compress",
    tag = "compress",
    request_body(content = CompressForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Zip archive of the compressed images.", body = String, content_type = "application/zip"),
        (status = 400, description = "No files were uploaded", body = ErrorResponse),
        (status = 405, description = "Method not allowed", body = ErrorResponse),
        (status = 500, description = "Upload error, every image failed or internal error", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn compress(context: ApiContext, form: FormData) -> impl warp::reply::Reply {
    debug!("In compress images");
    let mut pipeline = RequestPipeline::new(&context.compressor, &context.settings);
    let intake = intake::read_form(form, &context.settings.limits, pipeline.janitor_mut()).await;
    pipeline.execute(intake, context.reply()).await.response
}

/// CORS preflight handler.
#[utoipa::path(
    options,
    operation_id = "compressImagesPreflight",
    path = "/api/compress",
    tag = "compress",
    responses(
        (status = 204, description = "Preflight accepted."),
    )
)]
pub fn preflight(context: ApiContext) -> impl warp::reply::Reply {
    context.reply().no_content()
}
