//! Compression API Lambda entrypoint.

use tracing::info;
use warp::Filter;

use compress_api::api;
use compress_api::context::ApiContext;
use compress_api::logging;

#[tokio::main]
async fn main() {
    let context = ApiContext::from_env().unwrap_or_else(|e| panic!("{e}"));
    logging::setup_logging(&context.settings.logging.directives, context.settings.logging.format);

    info!(
        backend = ?context.settings.compression.backend,
        group_size = context.settings.limits.concurrency_group_size.get(),
        upload_dir = %context.settings.limits.upload_dir().display(),
        "compression context setup for lambda"
    );

    // Make routes.
    let routes = api::routes::routes(context).with(warp::log("api"));

    // Create warp service.
    let warp_service = warp::service(routes);

    warp_lambda::run(warp_service)
        .await
        .expect("An error occurred");
}
