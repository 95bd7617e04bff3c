//! The per-request state machine.
//!
//! ```text
//! Idle -> Validating -> Processing -> Assembling -> Responding -> Succeeded
//!             \              \             \
//!              `--------------`-------------`---> Responding -> Failed
//! ```
//!
//! Whatever the path, exactly one response is produced and every transient
//! file is released afterwards.

use std::panic::AssertUnwindSafe;

use futures::FutureExt as _;
use warp::http::StatusCode;
use warp::reply::Response;

use crate::api::reply::ResponseBuilder;
use crate::archive::{Archive, ArchiveAssembler};
use crate::batch::BatchScheduler;
use crate::common::error::Error;
use crate::compression::params::{COLORS_FIELD, DITHER_FIELD};
use crate::compression::{CompressionParameters, Compressor};
use crate::config::Settings;
use crate::intake::Intake;
use crate::janitor::ResourceJanitor;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing has happened yet.
    Idle,
    /// Checking the upload and parsing parameters.
    Validating,
    /// Compressing images.
    Processing,
    /// Building the archive.
    Assembling,
    /// Producing the response.
    Responding,
    /// The archive was sent.
    Succeeded,
    /// An error response was sent.
    Failed,
}

/// Counts from the batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Number of groups run.
    pub waves: usize,
    /// Images compressed.
    pub succeeded: usize,
    /// Images that failed.
    pub failed: usize,
}

/// What happened while serving one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    /// Terminal stage, [`Stage::Succeeded`] or [`Stage::Failed`].
    pub stage: Stage,
    /// The stage the error was raised in, when the request failed.
    pub failed_in: Option<Stage>,
    /// Status of the response.
    pub status: StatusCode,
    /// Batch counts; zero when processing never started.
    pub batch: BatchStats,
    /// Transient files removed.
    pub released: usize,
    /// Transient files that could not be removed.
    pub release_failures: usize,
}

/// The response of a finished request, with its summary.
#[derive(Debug)]
pub struct Completed {
    /// Response to send.
    pub response: Response,
    /// Request summary, already logged.
    pub summary: RequestSummary,
}

/// Drives one request from intake to cleanup.
#[derive(Debug)]
pub struct RequestPipeline<'a, C> {
    compressor: &'a C,
    settings: &'a Settings,
    stage: Stage,
    stats: BatchStats,
    janitor: ResourceJanitor,
}

impl<'a, C: Compressor> RequestPipeline<'a, C> {
    /// A pipeline in the [`Stage::Idle`] state.
    pub fn new(compressor: &'a C, settings: &'a Settings) -> Self {
        Self {
            compressor,
            settings,
            stage: Stage::Idle,
            stats: BatchStats::default(),
            janitor: ResourceJanitor::new(),
        }
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The janitor that intake registers its files with.
    pub fn janitor_mut(&mut self) -> &mut ResourceJanitor {
        &mut self.janitor
    }

    /// Run the request to completion. Never fails: every error, including
    /// a panic inside processing, becomes an error response.
    pub async fn execute(
        mut self,
        intake: Result<Intake, Error>,
        reply: ResponseBuilder,
    ) -> Completed {
        let result = AssertUnwindSafe(self.process(intake))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::Internal(panic_message(panic.as_ref()))));

        let failed_in = result.is_err().then_some(self.stage);
        self.stage = Stage::Responding;
        let response = match result {
            Ok(archive) => {
                tracing::debug!(
                    entries = archive.entries.len(),
                    size = archive.bytes.len(),
                    "archive ready"
                );
                reply.archive(archive)
            }
            Err(error) => {
                tracing::warn!(%error, stage = ?failed_in, "request failed");
                reply.error(&error)
            }
        };
        self.stage = match failed_in {
            None => Stage::Succeeded,
            Some(_) => Stage::Failed,
        };

        let tracked = self.janitor.len();
        let release_failures = self.janitor.release_all().await.len();

        let summary = RequestSummary {
            stage: self.stage,
            failed_in,
            status: response.status(),
            batch: self.stats,
            released: tracked - release_failures,
            release_failures,
        };
        tracing::info!(
            stage = ?summary.stage,
            status = summary.status.as_u16(),
            waves = summary.batch.waves,
            succeeded = summary.batch.succeeded,
            failed = summary.batch.failed,
            released = summary.released,
            release_failures = summary.release_failures,
            "request completed"
        );

        Completed { response, summary }
    }

    async fn process(&mut self, intake: Result<Intake, Error>) -> Result<Archive, Error> {
        self.stage = Stage::Validating;
        let intake = intake?;
        if intake.items.is_empty() {
            return Err(Error::NoFiles);
        }
        let params = CompressionParameters::from_fields(
            intake.field(COLORS_FIELD),
            intake.field(DITHER_FIELD),
            &self.settings.palette,
        );
        for item in &intake.items {
            self.janitor.track(&item.path);
            if let Some(derived) = self.compressor.derived_path(item) {
                self.janitor.track(derived);
            }
        }
        tracing::debug!(items = intake.items.len(), ?params, "upload validated");

        self.stage = Stage::Processing;
        let limits = &self.settings.limits;
        let scheduler = BatchScheduler::new(
            self.compressor,
            limits.concurrency_group_size,
            limits.item_timeout,
        );
        let report = scheduler.run(&intake.items, &params).await;
        for path in report.output_files() {
            self.janitor.track(path);
        }
        self.stats = BatchStats {
            waves: report.waves,
            succeeded: report.succeeded(),
            failed: report.failed(),
        };

        self.stage = Stage::Assembling;
        let outcomes = report.outcomes;
        let archive =
            tokio::task::spawn_blocking(move || ArchiveAssembler::default().assemble(&outcomes))
                .await
                .map_err(|err| Error::Internal(err.to_string()))??;

        Ok(archive)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "processing panicked".to_string())
}
