//! Models used by the compression API.

/// Api structures for the compression endpoint.
pub mod compress;
/// Api structures for the health endpoint.
pub mod health;
