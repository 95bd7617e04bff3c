//! Test utilities shared by unit and integration tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::compression::{
    CompressedImage, CompressionError, CompressionFailure, CompressionParameters, Compressor,
    Slot,
};
use crate::intake::UploadItem;

/// Image fixtures.
pub mod fixtures {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    /// Bytes that no decoder accepts.
    pub const CORRUPT_IMAGE: &[u8] = b"\x89PNG\r\n\x1a\nthis is not really an image";

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let image = RgbImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            let b = ((x + y) % 256) as u8;
            Rgb([r, g, b])
        });
        DynamicImage::ImageRgb8(image)
    }

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .expect("fixture encoding must succeed");
        bytes
    }

    /// A colourful PNG of the given size.
    pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        encode(&gradient(width, height), ImageFormat::Png)
    }

    /// A colourful JPEG of the given size.
    pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
        encode(&gradient(width, height), ImageFormat::Jpeg)
    }
}

/// Builds `multipart/form-data` bodies for `warp::test` requests.
#[derive(Debug, Clone)]
pub struct MultipartBuilder {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self {
            boundary: "----compress-api-test-boundary".to_string(),
            body: Vec::new(),
        }
    }
}

impl MultipartBuilder {
    /// An empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file part.
    pub fn file(mut self, field: &str, filename: &str, contents: &[u8]) -> Self {
        self.open_part();
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(contents);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Add a scalar field.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.open_part();
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    /// The `Content-Type` header value and the encoded body.
    pub fn build(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        let content_type = format!("multipart/form-data; boundary={}", self.boundary);
        (content_type, self.body)
    }

    fn open_part(&mut self) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

/// A scripted [`Compressor`] that records how many compressions run at the
/// same time.
#[derive(Debug, Default)]
pub struct FakeCompressor {
    failing: HashSet<String>,
    stalling: HashSet<String>,
    panicking: HashSet<String>,
    delay: Option<Duration>,
    blocking_work: Option<Duration>,
    reversed_delays: bool,
    writes_files: bool,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    /// Highest number of compressions observed in flight at once.
    pub peak_in_flight: Arc<AtomicUsize>,
}

impl FakeCompressor {
    /// Every compression sleeps for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every compression first blocks a thread of the blocking pool for
    /// `duration`. Dropping the future does not stop that work.
    pub fn with_blocking_work(mut self, duration: Duration) -> Self {
        self.blocking_work = Some(duration);
        self
    }

    /// Earlier calls sleep longer than later ones, so completion order is
    /// the reverse of call order.
    pub fn reversed_delays(mut self) -> Self {
        self.reversed_delays = true;
        self
    }

    /// Items with these logical names fail.
    pub fn failing<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.failing.extend(names.into_iter().map(str::to_string));
        self
    }

    /// Items with these logical names never finish.
    pub fn stalling<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.stalling.extend(names.into_iter().map(str::to_string));
        self
    }

    /// Items with these logical names panic.
    pub fn panicking<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.panicking.extend(names.into_iter().map(str::to_string));
        self
    }

    /// Write outputs next to the input, like an external tool.
    pub fn writing_files(mut self) -> Self {
        self.writes_files = true;
        self
    }

    /// Number of compressions started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of compressions still running, blocking work included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn output_path(item: &UploadItem) -> PathBuf {
        let mut path = item.path.clone().into_os_string();
        path.push("-min.png");
        PathBuf::from(path)
    }

    async fn run(
        &self,
        item: &UploadItem,
        call: usize,
        guard: InFlight,
        slot: Slot,
    ) -> Result<CompressedImage, CompressionError> {
        if let Some(duration) = self.blocking_work {
            let work = tokio::task::spawn_blocking(move || {
                let _held = (guard, slot);
                std::thread::sleep(duration);
            });
            work.await.map_err(|err| {
                let failure = CompressionFailure::Worker(err.to_string());
                CompressionError::new(&item.logical_name, failure)
            })?;
        } else {
            // Released when this future ends or is dropped.
            let _held = (guard, slot);
            self.scripted(item, call).await?;
        }
        self.output(item).await
    }

    async fn scripted(&self, item: &UploadItem, call: usize) -> Result<(), CompressionError> {
        if let Some(delay) = self.delay {
            let factor = match self.reversed_delays {
                true => 8u32.saturating_sub(call as u32).max(1),
                false => 1,
            };
            tokio::time::sleep(delay * factor).await;
        }

        let name = item.logical_name.as_str();
        if self.stalling.contains(name) {
            std::future::pending::<()>().await;
        }
        if self.panicking.contains(name) {
            panic!("scripted panic while compressing {name}");
        }
        if self.failing.contains(name) {
            let failure = CompressionFailure::Worker("scripted failure".to_string());
            return Err(CompressionError::new(name, failure));
        }
        Ok(())
    }

    async fn output(&self, item: &UploadItem) -> Result<CompressedImage, CompressionError> {
        let name = item.logical_name.as_str();
        let contents = format!("compressed {name}").into_bytes();
        if !self.writes_files {
            return Ok(CompressedImage::Bytes(contents));
        }
        let path = Self::output_path(item);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|err| CompressionError::new(name, err))?;
        Ok(CompressedImage::File(path))
    }
}

/// Decrements the in-flight counter however the compression ends.
#[derive(Debug)]
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Compressor for FakeCompressor {
    async fn compress(
        &self,
        item: &UploadItem,
        _params: &CompressionParameters,
        slot: Slot,
    ) -> Result<CompressedImage, CompressionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.in_flight));

        self.run(item, call, guard, slot).await
    }

    fn derived_path(&self, item: &UploadItem) -> Option<PathBuf> {
        self.writes_files.then(|| Self::output_path(item))
    }
}
