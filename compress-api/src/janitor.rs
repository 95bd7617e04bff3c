//! Tracking and release of the transient files created while serving one
//! request.
//!
//! Every temp input written during intake and every derived output written
//! by a compression backend is registered with the request's
//! [`ResourceJanitor`]. Once the response has been produced the pipeline
//! calls [`ResourceJanitor::release_all`], which attempts to delete every
//! tracked path exactly once and reports, but never propagates, failures.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A tracked resource that could not be released.
#[derive(Debug)]
pub struct ReleaseFailure {
    /// The path that could not be removed.
    pub path: PathBuf,
    /// Why removal failed.
    pub error: io::Error,
}

/// Owns the list of transient files for one request.
#[derive(Debug, Default)]
pub struct ResourceJanitor {
    resources: Vec<PathBuf>,
}

impl ResourceJanitor {
    /// Create an empty janitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for release. Returns `false` when the path was
    /// already tracked, so a resource is never released twice.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.resources.contains(&path) {
            return false;
        }
        debug!(path = %path.display(), "tracking transient resource");
        self.resources.push(path);
        true
    }

    /// Whether `path` is currently tracked.
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.resources.iter().any(|tracked| tracked == path)
    }

    /// The currently tracked paths, in registration order.
    pub fn tracked(&self) -> &[PathBuf] {
        &self.resources
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Remove every tracked path. A failure on one path does not stop the
    /// others; all failures are returned for logging. The tracked list is
    /// drained, so calling this again releases nothing.
    pub async fn release_all(&mut self) -> Vec<ReleaseFailure> {
        let mut failures = Vec::new();
        for path in self.resources.drain(..) {
            if let Err(error) = tokio::fs::remove_file(&path).await {
                log_failure(&path, &error);
                failures.push(ReleaseFailure { path, error });
            }
        }
        failures
    }
}

fn log_failure(path: &Path, error: &io::Error) {
    match error.kind() {
        io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "transient resource already gone")
        }
        _ => warn!(path = %path.display(), %error, "failed to release transient resource"),
    }
}

/// Dropping a janitor that still tracks resources (the request future was
/// cancelled before cleanup ran) releases them synchronously.
impl Drop for ResourceJanitor {
    fn drop(&mut self) {
        for path in self.resources.drain(..) {
            if let Err(error) = std::fs::remove_file(&path) {
                log_failure(&path, &error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"transient").unwrap();
        path
    }

    #[tokio::test]
    async fn release_all_removes_every_tracked_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut janitor = ResourceJanitor::new();
        let first = scratch_file(dir.path(), "a.png");
        let second = scratch_file(dir.path(), "a.png-min.png");
        janitor.track(&first);
        janitor.track(&second);

        let failures = janitor.release_all().await;

        assert!(failures.is_empty());
        assert!(!first.exists());
        assert!(!second.exists());
        assert!(janitor.is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let mut janitor = ResourceJanitor::new();
        let missing = dir.path().join("never-written.png");
        let present = scratch_file(dir.path(), "b.png");
        janitor.track(&missing);
        janitor.track(&present);

        let failures = janitor.release_all().await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, missing);
        assert_eq!(failures[0].error.kind(), io::ErrorKind::NotFound);
        assert!(!present.exists());
    }

    #[tokio::test]
    async fn resources_are_released_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut janitor = ResourceJanitor::new();
        let path = scratch_file(dir.path(), "c.png");

        assert!(janitor.track(&path));
        assert!(!janitor.track(&path));
        assert_eq!(janitor.len(), 1);

        assert!(janitor.release_all().await.is_empty());
        // Recreate the file: a second release must not touch it.
        std::fs::write(&path, b"new owner").unwrap();
        assert!(janitor.release_all().await.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn dropping_an_unreleased_janitor_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch_file(dir.path(), "d.png");
        {
            let mut janitor = ResourceJanitor::new();
            janitor.track(&path);
            assert!(janitor.is_tracked(&path));
        }
        assert!(!path.exists());
    }
}
