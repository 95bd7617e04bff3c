//! Bounded-concurrency execution of a batch of compressions.
//!
//! Items are split into consecutive groups ("waves"). All items of a wave
//! run concurrently and the whole wave is awaited before the next one
//! starts, so at most `group_size` compressions are ever in flight.
//!
//! A timeout only drops the future of an item. Work that a backend moved
//! off the runtime keeps its [`Slot`] until it actually stops, and a wave
//! is finished only once every slot is back.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::compression::{
    CompressedImage, CompressionError, CompressionFailure, CompressionParameters, Compressor,
    Slot,
};
use crate::intake::UploadItem;

/// What happened to one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionOutcome {
    /// The image was compressed.
    Success {
        /// The compressed image.
        output: CompressedImage,
        /// Archive entry name.
        output_name: String,
    },
    /// The image could not be compressed.
    Failure {
        /// Logical name of the input.
        input_name: String,
        /// Human readable reason.
        detail: String,
    },
}

impl CompressionOutcome {
    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Outcomes of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One outcome per input, in input order.
    pub outcomes: Vec<CompressionOutcome>,
    /// Number of groups that were run.
    pub waves: usize,
}

impl BatchReport {
    /// Number of successful outcomes.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_success()).count()
    }

    /// Number of failed outcomes.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Files written by the backend, which have to be released.
    pub fn output_files(&self) -> impl Iterator<Item = &std::path::Path> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            CompressionOutcome::Success { output: CompressedImage::File(path), .. } => {
                Some(path.as_path())
            }
            _ => None,
        })
    }
}

/// Runs compressions in sequential groups of bounded size.
#[derive(Debug)]
pub struct BatchScheduler<'a, C> {
    compressor: &'a C,
    group_size: usize,
    item_timeout: Duration,
    slots: Arc<Semaphore>,
}

impl<'a, C: Compressor> BatchScheduler<'a, C> {
    /// Create a scheduler for the given backend.
    pub fn new(compressor: &'a C, group_size: NonZeroUsize, item_timeout: Duration) -> Self {
        // `acquire_many` counts in u32.
        let group_size = group_size
            .get()
            .min(Semaphore::MAX_PERMITS)
            .min(u32::MAX as usize);
        Self {
            compressor,
            group_size,
            item_timeout,
            slots: Arc::new(Semaphore::new(group_size)),
        }
    }

    /// Compress every item. Never fails: each item yields exactly one
    /// outcome and a failing item does not affect its siblings.
    pub async fn run(&self, items: &[UploadItem], params: &CompressionParameters) -> BatchReport {
        let mut report = BatchReport {
            outcomes: Vec::with_capacity(items.len()),
            waves: 0,
        };

        for (wave, group) in items.chunks(self.group_size).enumerate() {
            tracing::debug!(wave = wave + 1, size = group.len(), "starting compression wave");

            let compressions = group.iter().map(|item| self.compress_one(item, params));
            report.outcomes.extend(join_all(compressions).await);
            self.settle().await;
            report.waves += 1;
        }

        report
    }

    /// Wait until no compression holds a slot.
    async fn settle(&self) {
        if self.slots.available_permits() == self.group_size {
            return;
        }
        tracing::debug!("waiting for abandoned compressions to stop");
        // Dropping the permits right away hands them to the next wave.
        let _all = self.slots.acquire_many(self.group_size as u32).await;
    }

    async fn compress_one(
        &self,
        item: &UploadItem,
        params: &CompressionParameters,
    ) -> CompressionOutcome {
        // Free at the start of every wave, since a wave never outnumbers the slots.
        let slot = Slot::new(self.slots.clone().acquire_owned().await.ok());
        let compression = self.compressor.compress(item, params, slot);
        let result = tokio::time::timeout(self.item_timeout, compression)
            .await
            .unwrap_or_else(|_| {
                let timeout = CompressionFailure::Timeout(self.item_timeout);
                Err(CompressionError::new(&item.logical_name, timeout))
            });

        match result {
            Ok(output) => CompressionOutcome::Success {
                output,
                output_name: item.output_name(self.compressor.output_extension()),
            },
            Err(error) => {
                tracing::warn!(%error, name = %item.logical_name, "image compression failed");
                CompressionOutcome::Failure {
                    input_name: item.logical_name.clone(),
                    detail: error.reason.to_string(),
                }
            }
        }
    }
}
