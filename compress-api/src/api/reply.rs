//! Response construction. Every response leaving the service, success or
//! failure, goes through a [`ResponseBuilder`] so it carries the CORS
//! headers.

use serde::Serialize;
use warp::http::header::{
    HeaderMap, HeaderValue, InvalidHeaderValue, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
    CONTENT_DISPOSITION, CONTENT_TYPE,
};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use crate::archive::Archive;
use crate::common::error::Error;
use crate::config::CorsConfig;

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";
const EXPOSED_HEADERS: &str = "Content-Type, Content-Disposition";
const ZIP_CONTENT_TYPE: &str = "application/zip";
const ZIP_DISPOSITION: &str = "attachment; filename=compressed.zip";

/// Cross-origin headers attached to every response.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
}

impl CorsPolicy {
    /// Build the policy from configuration.
    pub fn from_config(config: &CorsConfig) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            allow_origin: HeaderValue::from_str(&config.allow_origin)?,
        })
    }

    /// Insert the CORS headers, replacing any already present.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self { allow_origin: HeaderValue::from_static("*") }
    }
}

/// Produces exactly one response. Every method consumes the builder.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    cors: CorsPolicy,
}

impl ResponseBuilder {
    /// A builder attaching the given CORS policy.
    pub fn new(cors: CorsPolicy) -> Self {
        Self { cors }
    }

    /// `204 No Content`, used for preflight requests.
    pub fn no_content(self) -> Response {
        let response = warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT);
        self.finish(response.into_response())
    }

    /// The JSON failure body for `error` with its status code.
    pub fn error(self, error: &Error) -> Response {
        self.json(error.status_code(), &error.to_response())
    }

    /// A JSON body with the given status.
    pub fn json<T: Serialize>(self, status: StatusCode, body: &T) -> Response {
        let response = warp::reply::with_status(warp::reply::json(body), status);
        self.finish(response.into_response())
    }

    /// The archive as an attachment download.
    pub fn archive(self, archive: Archive) -> Response {
        let mut response = Response::new(archive.bytes.into());
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(ZIP_CONTENT_TYPE));
        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static(ZIP_DISPOSITION));
        self.finish(response)
    }

    fn finish(self, mut response: Response) -> Response {
        self.cors.apply(response.headers_mut());
        response
    }
}
