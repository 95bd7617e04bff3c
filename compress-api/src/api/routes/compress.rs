//! Route definitions for the compression endpoint.

use warp::http::Method;
use warp::reply::Response;
use warp::{Filter, Rejection};

use super::{handlers, with_context};
use crate::common::error::Error;
use crate::context::ApiContext;

/// Compression routes.
pub fn routes(
    context: ApiContext,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    compress_images(context.clone())
        .or(preflight(context))
        .or(other_methods())
}

/// Compress images endpoint.
fn compress_images(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let max_length = context.settings.limits.max_request_bytes;
    warp::path!("api" / "compress")
        .and(warp::post())
        .and(with_context(context))
        .and(warp::multipart::form().max_length(max_length))
        .then(handlers::compress::compress)
}

/// Preflight endpoint.
fn preflight(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("api" / "compress")
        .and(warp::options())
        .and(with_context(context))
        .map(handlers::compress::preflight)
}

/// Any other method on the endpoint is rejected with [`Error::PostOnly`].
fn other_methods() -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    warp::path!("api" / "compress")
        .and(warp::method())
        .and_then(reject_method)
}

async fn reject_method(method: Method) -> Result<Response, Rejection> {
    // POST and OPTIONS only get here when their own route rejected the
    // request, and that rejection is the one to report.
    match method {
        Method::POST | Method::OPTIONS => Err(warp::reject::not_found()),
        _ => Err(warp::reject::custom(Error::PostOnly)),
    }
}
