//! Handlers for the compression API

use std::convert::Infallible;

use tracing::{debug, error};
use warp::reply::Response;
use warp::Rejection;

use super::reply::{CorsPolicy, ResponseBuilder};
use crate::common::error::Error;

/// Compression handlers.
pub mod compress;
/// Health handlers.
pub mod health;

/// Central error handler for Warp rejections. Anything a route rejected is
/// turned into the usual JSON error body, with CORS headers.
pub async fn handle_rejection(err: Rejection, cors: CorsPolicy) -> Result<Response, Infallible> {
    let error = rejection_error(&err);
    match &error {
        Error::Fatal(_) => error!("Unhandled rejection: {:?}", err),
        other => debug!(error = %other, "request rejected"),
    }

    Ok(ResponseBuilder::new(cors).error(&error))
}

/// Map a rejection onto the request error it stands for. Body problems are
/// checked first: a rejected upload also carries the method rejections of
/// the sibling routes.
fn rejection_error(err: &Rejection) -> Error {
    if let Some(Error::Upload(detail)) = err.find::<Error>() {
        return Error::Upload(detail.clone());
    }
    if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        return Error::Upload(e.to_string());
    }
    if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        return Error::Upload(e.to_string());
    }
    if let Some(e) = err.find::<warp::reject::MissingHeader>() {
        return Error::Upload(e.to_string());
    }
    if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        return Error::Upload(e.to_string());
    }
    if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        return Error::Upload(e.to_string());
    }
    if let Some(Error::PostOnly) = err.find::<Error>() {
        return Error::PostOnly;
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Error::MethodNotAllowed;
    }
    if err.is_not_found() {
        return Error::NotFound;
    }
    Error::Fatal(format!("{err:?}"))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use warp::http::StatusCode;

    use super::*;

    async fn body_of(rejection: Rejection) -> (StatusCode, serde_json::Value) {
        let response = handle_rejection(rejection, CorsPolicy::default()).await.unwrap();
        let status = response.status();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn not_found_is_a_json_404() {
        let (status, body) = body_of(warp::reject::not_found()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, serde_json::json!({ "error": "Not found" }));
    }

    #[test_case(Error::Upload("bad boundary".into()), 500, "Upload error"; "upload")]
    #[test_case(Error::PostOnly, 405, "POST only"; "compression endpoint method")]
    #[test_case(Error::NoFiles, 500, "Fatal error"; "unexpected custom")]
    #[tokio::test]
    async fn custom_rejections_are_mapped(error: Error, status: u16, message: &str) {
        let (actual, body) = body_of(warp::reject::custom(error)).await;
        assert_eq!(actual.as_u16(), status);
        assert_eq!(body["error"], message);
    }

    #[tokio::test]
    async fn wrong_method_elsewhere_gets_a_neutral_message() {
        let rejection = warp::test::request()
            .method("POST")
            .filter(&warp::get())
            .await
            .err()
            .expect("POST must be rejected");

        let (status, body) = body_of(rejection).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, serde_json::json!({ "error": "Method not allowed" }));
    }
}
