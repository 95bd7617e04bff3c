//! Top-level error type for the compression endpoint

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use warp::http::StatusCode;
use warp::reject::Reject;

use crate::archive::AssemblyError;

/// Errors that end a request. Per-image failures are not represented here;
/// they are recovered inside the batch and only surface as
/// [`Error::ProcessingFailed`] when every image failed.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The compression endpoint was called with a method other than POST
    /// or OPTIONS.
    #[error("Only POST is accepted")]
    PostOnly,

    /// The route exists but not for the request's method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The requested path does not exist.
    #[error("Resource not found")]
    NotFound,

    /// The multipart form did not contain a single file part.
    #[error("No files were uploaded")]
    NoFiles,

    /// The multipart body could not be read or stored.
    #[error("Upload error: {0}")]
    Upload(String),

    /// A single uploaded file was larger than the configured limit.
    #[error("File {name} exceeds the maximum size of {limit} bytes")]
    FileTooLarge {
        /// Logical name of the offending upload.
        name: String,
        /// The configured per-file limit.
        limit: u64,
    },

    /// Every image in the batch failed to compress.
    #[error("Processing failed")]
    ProcessingFailed,

    /// Unexpected fault inside the pipeline, e.g. the archive could not be
    /// built or a worker panicked.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A failure the request handling did not anticipate at all.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Error implementation.
impl Error {
    /// Provides the status code that corresponds to the error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::PostOnly | Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::NoFiles => StatusCode::BAD_REQUEST,
            Error::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FileTooLarge { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::ProcessingFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Provides the short summary sent in the `error` field.
    pub fn error_message(&self) -> &'static str {
        match self {
            Error::PostOnly => "POST only",
            Error::MethodNotAllowed => "Method not allowed",
            Error::NotFound => "Not found",
            Error::NoFiles => "No files",
            Error::Upload(_) | Error::FileTooLarge { .. } => "Upload error",
            Error::ProcessingFailed => "Processing failed",
            Error::Internal(_) => "Internal error",
            Error::Fatal(_) => "Fatal error",
        }
    }

    /// Provides the optional `detail` field.
    pub fn detail(&self) -> Option<String> {
        match self {
            Error::Upload(detail) | Error::Internal(detail) | Error::Fatal(detail) => {
                Some(detail.clone())
            }
            Error::FileTooLarge { .. } => Some(self.to_string()),
            Error::PostOnly
            | Error::MethodNotAllowed
            | Error::NotFound
            | Error::NoFiles
            | Error::ProcessingFailed => None,
        }
    }

    /// The JSON body describing this error.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_message().to_string(),
            detail: self.detail(),
        }
    }
}

impl Reject for Error {}

impl From<AssemblyError> for Error {
    fn from(err: AssemblyError) -> Self {
        match err {
            AssemblyError::Empty => Error::ProcessingFailed,
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<warp::Error> for Error {
    fn from(err: warp::Error) -> Self {
        Error::Upload(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Upload(err.to_string())
    }
}

/// Structure representing an error response
/// This is used to serialize error messages in HTTP responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Short summary of the failure.
    pub error: String,
    /// Additional information, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
