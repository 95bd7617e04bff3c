//! Types shared across the API surface and the processing pipeline.

/// Request level error type.
pub mod error;

pub use error::{Error, ErrorResponse};
