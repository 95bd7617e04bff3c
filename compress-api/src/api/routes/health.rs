//! Route definitions for the health endpoint.

use warp::Filter;

use super::{handlers, with_context};
use crate::context::ApiContext;

/// Health routes.
pub fn routes(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_health(context)
}

/// Get health endpoint.
fn get_health(
    context: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("health")
        .and(warp::get())
        .and(with_context(context))
        .then(handlers::health::get_health)
}
