//! Route definitions for the compression API.

use std::convert::Infallible;

use warp::Filter;

use super::handlers;
use crate::context::ApiContext;

/// Compression routes.
mod compress;
/// Health routes.
mod health;

/// This function sets up the Warp filters for handling all requests,
/// including the rejection handler, so every response carries CORS.
pub fn routes(
    context: ApiContext,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let cors = context.cors.clone();
    compress::routes(context.clone())
        .or(health::routes(context))
        .recover(move |rejection| handlers::handle_rejection(rejection, cors.clone()))
}

/// Hand a clone of the context to each request.
fn with_context(
    context: ApiContext,
) -> impl Filter<Extract = (ApiContext,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}
