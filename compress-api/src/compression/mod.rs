//! Image compression backends.
//!
//! A [`Compressor`] turns one uploaded image into a palette-reduced PNG.
//! Backends either hand the encoded bytes back directly
//! ([`PaletteCompressor`]) or write a derived file next to the input
//! ([`ExternalCompressor`]); [`CompressedImage`] carries both forms.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;

use crate::config::{BackendKind, CompressionConfig};
use crate::intake::UploadItem;

pub mod external;
pub mod palette;
pub mod params;

pub use external::ExternalCompressor;
pub use palette::PaletteCompressor;
pub use params::CompressionParameters;

/// Extension of every compressed output.
pub const TARGET_EXTENSION: &str = "png";

/// The result of compressing one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressedImage {
    /// Encoded image held in memory.
    Bytes(Vec<u8>),
    /// Encoded image written to a derived file.
    File(PathBuf),
}

/// Why a single image could not be compressed.
#[derive(Debug, thiserror::Error)]
pub enum CompressionFailure {
    /// The input is corrupt or in a format the decoder does not support.
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The palette image could not be encoded.
    #[error("could not encode png: {0}")]
    Encode(#[from] png::EncodingError),

    /// Reading the input or writing the output failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The external tool could not be started.
    #[error("could not run {program}: {source}")]
    Spawn {
        /// The configured program.
        program: String,
        /// Why spawning failed.
        #[source]
        source: std::io::Error,
    },

    /// The external tool exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    ExitStatus {
        /// The configured program.
        program: String,
        /// Exit code, or `signal` when the process was killed.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// Compression exceeded the per-item timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The worker running the compression panicked or was cancelled.
    #[error("compression worker failed: {0}")]
    Worker(String),

    /// Work stopped early because nobody waits for the result anymore.
    #[error("compression was cancelled")]
    Cancelled,
}

/// A failed compression together with the item it belongs to.
#[derive(Debug, thiserror::Error)]
#[error("failed to compress {item}: {reason}")]
pub struct CompressionError {
    /// Logical name of the offending upload.
    pub item: String,
    /// What went wrong.
    #[source]
    pub reason: CompressionFailure,
}

impl CompressionError {
    /// Attach an item name to a failure.
    pub fn new(item: impl Into<String>, reason: impl Into<CompressionFailure>) -> Self {
        Self { item: item.into(), reason: reason.into() }
    }
}

/// One of the batch's concurrency slots.
///
/// A backend holds the slot until its work has really stopped, including
/// work handed to the blocking pool that outlives a dropped future. The
/// scheduler does not start the next group before every slot is back.
#[derive(Debug)]
pub struct Slot(Option<OwnedSemaphorePermit>);

impl Slot {
    /// A slot that is not counted against any limit, for running a backend
    /// outside of a batch.
    pub fn unbounded() -> Self {
        Self(None)
    }

    pub(crate) fn new(permit: Option<OwnedSemaphorePermit>) -> Self {
        Self(permit)
    }
}

/// Turns an uploaded image into a palette-reduced image in the target format.
///
/// Implementations must be idempotent: compressing the same input with the
/// same parameters yields an equivalent image.
pub trait Compressor: Send + Sync {
    /// Compress a single uploaded image while occupying `slot`.
    fn compress(
        &self,
        item: &UploadItem,
        params: &CompressionParameters,
        slot: Slot,
    ) -> impl Future<Output = Result<CompressedImage, CompressionError>> + Send;

    /// The file a backend writes its output to, if it writes one. The
    /// pipeline tracks this path before compression starts so that partial
    /// outputs are cleaned up as well.
    fn derived_path(&self, _item: &UploadItem) -> Option<PathBuf> {
        None
    }

    /// Extension of the emitted format.
    fn output_extension(&self) -> &'static str {
        TARGET_EXTENSION
    }
}

/// The configured compression backend.
#[derive(Debug, Clone)]
pub enum CompressionBackend {
    /// In-process palette quantization.
    Palette(PaletteCompressor),
    /// External command line tool.
    External(ExternalCompressor),
}

impl CompressionBackend {
    /// Build the backend selected in the configuration.
    pub fn from_config(config: &CompressionConfig) -> Self {
        match config.backend {
            BackendKind::Palette => Self::Palette(PaletteCompressor::default()),
            BackendKind::External => {
                Self::External(ExternalCompressor::from_config(&config.external))
            }
        }
    }
}

impl Compressor for CompressionBackend {
    async fn compress(
        &self,
        item: &UploadItem,
        params: &CompressionParameters,
        slot: Slot,
    ) -> Result<CompressedImage, CompressionError> {
        match self {
            Self::Palette(compressor) => compressor.compress(item, params, slot).await,
            Self::External(compressor) => compressor.compress(item, params, slot).await,
        }
    }

    fn derived_path(&self, item: &UploadItem) -> Option<PathBuf> {
        match self {
            Self::Palette(compressor) => compressor.derived_path(item),
            Self::External(compressor) => compressor.derived_path(item),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn backend_follows_configuration() {
        let settings = Settings::new_from_default_config().unwrap();
        let backend = CompressionBackend::from_config(&settings.compression);
        assert!(matches!(backend, CompressionBackend::Palette(_)));

        let settings =
            Settings::with_overrides([("COMPRESS_API_COMPRESSION__BACKEND", "external")])
                .unwrap();
        let backend = CompressionBackend::from_config(&settings.compression);
        assert!(matches!(backend, CompressionBackend::External(_)));
    }

    #[test]
    fn only_the_external_backend_derives_files() {
        let item = UploadItem::new("/tmp/upload-1.jpg", "photo.jpg", 10);

        let palette = CompressionBackend::Palette(PaletteCompressor::default());
        assert_eq!(palette.derived_path(&item), None);
        assert_eq!(palette.output_extension(), "png");

        let settings = Settings::new_from_default_config().unwrap();
        let external = CompressionBackend::External(ExternalCompressor::from_config(
            &settings.compression.external,
        ));
        assert_eq!(
            external.derived_path(&item),
            Some(PathBuf::from("/tmp/upload-1.jpg-min.png"))
        );
    }

    #[test]
    fn error_names_the_item() {
        let error = CompressionError::new(
            "cat.png",
            CompressionFailure::Timeout(Duration::from_secs(2)),
        );
        assert_eq!(error.to_string(), "failed to compress cat.png: timed out after 2s");
    }
}
