//! In-process palette quantization.
//!
//! The input is decoded with `image`, reduced to `palette_size` colours with
//! NeuQuant, optionally Floyd–Steinberg dithered, and written as an 8-bit
//! indexed PNG. Decoding and quantization are CPU bound, so they run on the
//! blocking pool. Dropping the compression future raises a cancellation
//! flag that the blocking work checks between stages and between rows.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use color_quant::NeuQuant;
use image::RgbaImage;

use super::{
    CompressedImage, CompressionError, CompressionFailure, CompressionParameters, Compressor,
    Slot,
};
use crate::intake::UploadItem;

/// NeuQuant sampling factor: 1 looks at every pixel, 30 is the fastest.
const DEFAULT_SAMPLE_FACTOR: i32 = 10;

/// Palette quantizer producing indexed PNGs.
#[derive(Debug, Clone)]
pub struct PaletteCompressor {
    sample_factor: i32,
    compression: png::Compression,
}

impl Default for PaletteCompressor {
    fn default() -> Self {
        Self {
            sample_factor: DEFAULT_SAMPLE_FACTOR,
            compression: png::Compression::Best,
        }
    }
}

impl PaletteCompressor {
    /// Compress an encoded image held in memory.
    pub fn compress_bytes(
        &self,
        input: &[u8],
        params: CompressionParameters,
    ) -> Result<Vec<u8>, CompressionFailure> {
        self.compress_until_cancelled(input, params, &AtomicBool::new(false))
    }

    fn compress_until_cancelled(
        &self,
        input: &[u8],
        params: CompressionParameters,
        cancelled: &AtomicBool,
    ) -> Result<Vec<u8>, CompressionFailure> {
        let image = image::load_from_memory(input)?.to_rgba8();
        check_cancelled(cancelled)?;
        let quantizer = NeuQuant::new(
            self.sample_factor,
            usize::from(params.palette_size),
            image.as_raw(),
        );
        check_cancelled(cancelled)?;

        let indices = match params.dither {
            true => dithered_indices(&image, &quantizer, cancelled)?,
            false => plain_indices(&image, &quantizer, cancelled)?,
        };
        check_cancelled(cancelled)?;

        let encoded = self.encode_indexed(
            image.width(),
            image.height(),
            &quantizer.color_map_rgba(),
            &indices,
        )?;
        Ok(encoded)
    }

    fn compress_file(
        &self,
        path: &Path,
        params: CompressionParameters,
        cancelled: &AtomicBool,
    ) -> Result<Vec<u8>, CompressionFailure> {
        let input = std::fs::read(path)?;
        check_cancelled(cancelled)?;
        self.compress_until_cancelled(&input, params, cancelled)
    }

    fn encode_indexed(
        &self,
        width: u32,
        height: u32,
        palette_rgba: &[u8],
        indices: &[u8],
    ) -> Result<Vec<u8>, png::EncodingError> {
        let mut palette = Vec::with_capacity(palette_rgba.len() / 4 * 3);
        let mut alpha = Vec::with_capacity(palette_rgba.len() / 4);
        for entry in palette_rgba.chunks_exact(4) {
            palette.extend_from_slice(&entry[..3]);
            alpha.push(entry[3]);
        }
        // tRNS may be shorter than the palette; missing entries are opaque.
        while alpha.last() == Some(&u8::MAX) {
            alpha.pop();
        }

        let mut encoded = Vec::new();
        let mut encoder = png::Encoder::new(&mut encoded, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(self.compression);
        encoder.set_palette(palette);
        if !alpha.is_empty() {
            encoder.set_trns(alpha);
        }

        let mut writer = encoder.write_header()?;
        writer.write_image_data(indices)?;
        writer.finish()?;

        Ok(encoded)
    }
}

impl Compressor for PaletteCompressor {
    async fn compress(
        &self,
        item: &UploadItem,
        params: &CompressionParameters,
        slot: Slot,
    ) -> Result<CompressedImage, CompressionError> {
        let compressor = self.clone();
        let path = item.path.clone();
        let params = *params;
        let cancel = CancelOnDrop::default();
        let cancelled = cancel.flag();

        let encoded = tokio::task::spawn_blocking(move || {
            // The slot goes back only when the work below has stopped.
            let _slot = slot;
            compressor.compress_file(&path, params, &cancelled)
        })
        .await
        .map_err(|err| {
            CompressionError::new(&item.logical_name, CompressionFailure::Worker(err.to_string()))
        })?
        .map_err(|reason| CompressionError::new(&item.logical_name, reason))?;

        Ok(CompressedImage::Bytes(encoded))
    }
}

/// Raises its flag when dropped, which tells the blocking work that its
/// result is no longer awaited.
#[derive(Debug, Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl CancelOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<(), CompressionFailure> {
    match cancelled.load(Ordering::Relaxed) {
        true => Err(CompressionFailure::Cancelled),
        false => Ok(()),
    }
}

fn palette_index(quantizer: &NeuQuant, pixel: &[u8; 4]) -> u8 {
    // Palettes hold at most 256 entries.
    quantizer.index_of(pixel) as u8
}

fn plain_indices(
    image: &RgbaImage,
    quantizer: &NeuQuant,
    cancelled: &AtomicBool,
) -> Result<Vec<u8>, CompressionFailure> {
    let mut indices = Vec::with_capacity(image.width() as usize * image.height() as usize);
    for row in image.rows() {
        check_cancelled(cancelled)?;
        indices.extend(row.map(|pixel| palette_index(quantizer, &pixel.0)));
    }
    Ok(indices)
}

/// Floyd–Steinberg error diffusion. Errors are kept in sixteenths for the
/// current and the next row only.
fn dithered_indices(
    image: &RgbaImage,
    quantizer: &NeuQuant,
    cancelled: &AtomicBool,
) -> Result<Vec<u8>, CompressionFailure> {
    let width = image.width() as usize;
    let mut indices = Vec::with_capacity(width * image.height() as usize);
    // One cell of padding on each side so neighbours never go out of bounds.
    let mut current = vec![[0i32; 4]; width + 2];
    let mut next = vec![[0i32; 4]; width + 2];

    for row in image.rows() {
        check_cancelled(cancelled)?;
        for (x, pixel) in row.enumerate() {
            let mut wanted = [0u8; 4];
            for channel in 0..4 {
                let value = i32::from(pixel.0[channel]) + current[x + 1][channel] / 16;
                wanted[channel] = value.clamp(0, 255) as u8;
            }

            let index = palette_index(quantizer, &wanted);
            let chosen = quantizer.lookup(usize::from(index)).unwrap_or(wanted);
            indices.push(index);

            for channel in 0..4 {
                let error = i32::from(wanted[channel]) - i32::from(chosen[channel]);
                current[x + 2][channel] += error * 7;
                next[x][channel] += error * 3;
                next[x + 1][channel] += error * 5;
                next[x + 2][channel] += error;
            }
        }
        std::mem::swap(&mut current, &mut next);
        next.iter_mut().for_each(|cell| *cell = [0; 4]);
    }

    Ok(indices)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;
    use crate::testing::fixtures;

    fn decode_info(encoded: &[u8]) -> (png::ColorType, u32, u32, usize) {
        let decoder = png::Decoder::new(Cursor::new(encoded));
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        let palette_len = info.palette.as_ref().map(|p| p.len() / 3).unwrap_or(0);
        (info.color_type, info.width, info.height, palette_len)
    }

    #[test]
    fn output_is_an_indexed_png_with_the_requested_palette() {
        let input = fixtures::gradient_png(64, 48);
        let params = CompressionParameters { palette_size: 16, dither: false };

        let encoded = PaletteCompressor::default().compress_bytes(&input, params).unwrap();

        let (color_type, width, height, palette_len) = decode_info(&encoded);
        assert_eq!(color_type, png::ColorType::Indexed);
        assert_eq!((width, height), (64, 48));
        assert!(palette_len <= 16);
        assert!(palette_len >= 2);
    }

    #[test_case::test_case(2, true; "two colours dithered")]
    #[test_case::test_case(32, true; "default dithered")]
    #[test_case::test_case(256, false; "full palette plain")]
    fn every_palette_size_in_range_encodes(palette_size: u16, dither: bool) {
        let input = fixtures::gradient_png(40, 40);
        let params = CompressionParameters { palette_size, dither };

        let encoded = PaletteCompressor::default().compress_bytes(&input, params).unwrap();

        let (_, _, _, palette_len) = decode_info(&encoded);
        assert!(palette_len <= usize::from(palette_size));
    }

    #[test]
    fn other_formats_are_normalized_to_png() {
        let input = fixtures::gradient_jpeg(32, 32);
        let params = CompressionParameters { palette_size: 32, dither: true };

        let encoded = PaletteCompressor::default().compress_bytes(&input, params).unwrap();

        assert_eq!(image::guess_format(&encoded).unwrap(), image::ImageFormat::Png);
    }

    #[test]
    fn compression_is_deterministic() {
        let input = fixtures::gradient_png(24, 24);
        let params = CompressionParameters { palette_size: 8, dither: true };
        let compressor = PaletteCompressor::default();

        let first = compressor.compress_bytes(&input, params).unwrap();
        let second = compressor.compress_bytes(&input, params).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_input_is_a_decode_failure() {
        let params = CompressionParameters { palette_size: 32, dither: true };
        let result = PaletteCompressor::default().compress_bytes(fixtures::CORRUPT_IMAGE, params);
        assert!(matches!(result, Err(CompressionFailure::Decode(_))));
    }

    #[tokio::test]
    async fn compress_reads_the_upload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload-1.png");
        std::fs::write(&path, fixtures::gradient_png(16, 16)).unwrap();
        let item = UploadItem::new(&path, "tiny.png", 0);
        let params = CompressionParameters { palette_size: 4, dither: false };

        let output = PaletteCompressor::default()
            .compress(&item, &params, Slot::unbounded())
            .await
            .unwrap();

        match output {
            CompressedImage::Bytes(bytes) => assert_eq!(decode_info(&bytes).1, 16),
            CompressedImage::File(path) => panic!("unexpected derived file {path:?}"),
        }
    }

    #[tokio::test]
    async fn missing_upload_names_the_item() {
        let dir = tempfile::tempdir().unwrap();
        let item = UploadItem::new(dir.path().join("gone.png"), "gone.png", 0);
        let params = CompressionParameters { palette_size: 4, dither: false };

        let error = PaletteCompressor::default()
            .compress(&item, &params, Slot::unbounded())
            .await
            .unwrap_err();

        assert_eq!(error.item, "gone.png");
        assert!(matches!(error.reason, CompressionFailure::Io(_)));
    }

    #[test]
    fn raised_flag_stops_the_work() {
        let input = fixtures::gradient_png(32, 32);
        let params = CompressionParameters { palette_size: 32, dither: true };
        let cancelled = AtomicBool::new(true);

        let result =
            PaletteCompressor::default().compress_until_cancelled(&input, params, &cancelled);

        assert!(matches!(result, Err(CompressionFailure::Cancelled)));
    }

    #[test]
    fn dropping_the_guard_raises_the_flag() {
        let cancel = CancelOnDrop::default();
        let cancelled = cancel.flag();
        assert!(check_cancelled(&cancelled).is_ok());

        drop(cancel);

        assert!(matches!(check_cancelled(&cancelled), Err(CompressionFailure::Cancelled)));
    }

    #[tokio::test]
    async fn timed_out_compression_keeps_its_slot_until_the_work_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload-1.png");
        std::fs::write(&path, fixtures::gradient_png(1200, 1200)).unwrap();
        let item = UploadItem::new(&path, "large.png", 0);
        let params = CompressionParameters { palette_size: 256, dither: true };
        let slots = Arc::new(tokio::sync::Semaphore::new(1));
        let permit = slots.clone().acquire_owned().await.unwrap();

        let compressor = PaletteCompressor::default();
        let compression = compressor.compress(&item, &params, Slot::new(Some(permit)));
        let result = tokio::time::timeout(Duration::from_millis(1), compression).await;
        assert!(result.is_err());

        // The blocking work notices the cancellation and hands the slot back.
        let released = tokio::time::timeout(Duration::from_secs(30), slots.acquire()).await;
        assert!(released.is_ok());
    }
}
