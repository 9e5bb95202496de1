use crate::config::CompressionConfig;
use crate::error::CompressionError;
use crate::media::MediaPayload;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::{debug, trace};

/// Fraction of the budget below which the input is passed through untouched
const SKIP_THRESHOLD: f64 = 0.8;

/// Quality used for the final dimension-shrink pass
const SHRINK_PASS_QUALITY: u8 = 60;

/// Fraction both dimensions are multiplied by in the final shrink pass
const SHRINK_FACTOR: f64 = 0.7;

/// Result of a compression pass
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// The (possibly re-encoded) image
    pub payload: MediaPayload,
    /// Encoded size of the input in bytes
    pub original_size_bytes: u64,
    /// Encoded size of the output in bytes
    pub compressed_size_bytes: u64,
    /// Number of JPEG encode attempts performed
    pub encode_attempts: u32,
}

/// Compress an encoded image to fit a payload budget.
///
/// Deterministic two-phase search with no hidden state: a bounding-box
/// resize followed by a descending quality ladder, then at most one 30%
/// dimension shrink at a fixed quality. Terminates in a bounded number of
/// encode attempts and always returns a valid encoded image, even when the
/// final size still exceeds the budget.
pub fn compress(
    encoded: &[u8],
    options: &CompressionConfig,
) -> Result<CompressionOutcome, CompressionError> {
    let original_size = encoded.len() as u64;
    let budget_bytes = (options.max_size_mb * 1024.0 * 1024.0) as u64;

    // Already comfortably under budget: skip the re-encode entirely
    if (original_size as f64) < SKIP_THRESHOLD * budget_bytes as f64 {
        trace!(
            "Image of {} bytes is under {}% of the {} byte budget; passing through",
            original_size,
            (SKIP_THRESHOLD * 100.0) as u32,
            budget_bytes
        );
        let (width, height) = probe_dimensions(encoded);
        return Ok(CompressionOutcome {
            payload: MediaPayload {
                data: std::sync::Arc::new(encoded.to_vec()),
                width,
                height,
            },
            original_size_bytes: original_size,
            compressed_size_bytes: original_size,
            encode_attempts: 0,
        });
    }

    let img = image::load_from_memory(encoded).map_err(|e| CompressionError::Decode {
        details: e.to_string(),
    })?;

    // Bounding-box resize preserving aspect ratio
    let resized = if img.width() > options.max_width_px || img.height() > options.max_height_px {
        debug!(
            "Resizing {}x{} into {}x{} bounding box",
            img.width(),
            img.height(),
            options.max_width_px,
            options.max_height_px
        );
        img.resize(
            options.max_width_px,
            options.max_height_px,
            FilterType::Triangle,
        )
    } else {
        img
    };

    let mut attempts = 0u32;
    let mut quality = (options.quality * 100.0).round() as u8;
    let mut buf = encode_jpeg(&resized, quality, &mut attempts)?;

    // Phase one: walk the quality ladder down to the floor
    while buf.len() as u64 > budget_bytes && quality > 10 {
        quality = quality.saturating_sub(10).max(10);
        debug!(
            "Encoded size {} over budget {}; retrying at quality {}",
            buf.len(),
            budget_bytes,
            quality
        );
        buf = encode_jpeg(&resized, quality, &mut attempts)?;
    }

    // Phase two: one dimension shrink at a fixed moderate quality, then stop
    let mut final_image = resized;
    if buf.len() as u64 > budget_bytes {
        let width = ((final_image.width() as f64 * SHRINK_FACTOR) as u32).max(1);
        let height = ((final_image.height() as f64 * SHRINK_FACTOR) as u32).max(1);
        debug!(
            "Quality floor reached at {} bytes; shrinking to {}x{}",
            buf.len(),
            width,
            height
        );
        final_image = final_image.resize_exact(width, height, FilterType::Triangle);
        buf = encode_jpeg(&final_image, SHRINK_PASS_QUALITY, &mut attempts)?;
    }

    let compressed_size = buf.len() as u64;
    debug!(
        "Compressed {} -> {} bytes in {} encode attempts",
        original_size, compressed_size, attempts
    );

    Ok(CompressionOutcome {
        payload: MediaPayload::new(buf, final_image.width(), final_image.height()),
        original_size_bytes: original_size,
        compressed_size_bytes: compressed_size,
        encode_attempts: attempts,
    })
}

/// Produce a small preview encoded at moderate quality. Used for every
/// captured item; previews are bounded by `edge_px` on the long side.
pub fn make_thumbnail(encoded: &[u8], edge_px: u32) -> Result<MediaPayload, CompressionError> {
    let img = image::load_from_memory(encoded).map_err(|e| CompressionError::Decode {
        details: e.to_string(),
    })?;

    let thumb = img.thumbnail(edge_px, edge_px);
    let mut attempts = 0u32;
    let buf = encode_jpeg(&thumb, 70, &mut attempts)?;

    Ok(MediaPayload::new(buf, thumb.width(), thumb.height()))
}

fn encode_jpeg(
    img: &DynamicImage,
    quality: u8,
    attempts: &mut u32,
) -> Result<Vec<u8>, CompressionError> {
    *attempts += 1;
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(&img.to_rgb8())
        .map_err(|e| CompressionError::Encode {
            details: e.to_string(),
        })?;
    Ok(buf)
}

/// Best-effort dimension probe that reads only the image header
fn probe_dimensions(encoded: &[u8]) -> (u32, u32) {
    image::io::Reader::new(Cursor::new(encoded))
        .with_guessed_format()
        .ok()
        .and_then(|r| r.into_dimensions().ok())
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    /// Deterministic noise image; noise defeats JPEG compression, which is
    /// what the size-bounded search needs to be exercised against.
    fn noise_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let mut state: u32 = 0x2545_F491;
        let img = RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let b = state.to_le_bytes();
            image::Rgb([b[0], b[1], b[2]])
        });
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode_image(&img).unwrap();
        buf
    }

    fn flat_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([120, 130, 140]));
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, 85);
        encoder.encode_image(&img).unwrap();
        buf
    }

    fn options(max_size_mb: f64) -> CompressionConfig {
        CompressionConfig {
            max_size_mb,
            ..CompressionConfig::default()
        }
    }

    #[test]
    fn test_small_input_passes_through_unchanged() {
        let encoded = flat_jpeg(640, 480);
        let outcome = compress(&encoded, &options(2.5)).unwrap();

        assert_eq!(outcome.encode_attempts, 0);
        assert_eq!(outcome.original_size_bytes, outcome.compressed_size_bytes);
        assert_eq!(&*outcome.payload.data, &encoded);
        assert_eq!(outcome.payload.width, 640);
        assert_eq!(outcome.payload.height, 480);
    }

    #[test]
    fn test_oversized_input_lands_near_budget() {
        // Scenario: a multi-megabyte original against a 2.5MB budget
        let encoded = noise_jpeg(3000, 2000, 95);
        assert!(
            encoded.len() > 3 * 1024 * 1024,
            "fixture should exceed the budget, got {} bytes",
            encoded.len()
        );

        let opts = options(2.5);
        let budget = (opts.max_size_mb * 1024.0 * 1024.0) as u64;
        let outcome = compress(&encoded, &opts).unwrap();

        assert!(outcome.compressed_size_bytes < outcome.original_size_bytes);
        assert!(
            outcome.compressed_size_bytes as f64 <= budget as f64 * 1.2,
            "result {} should be within 1.2x of budget {}",
            outcome.compressed_size_bytes,
            budget
        );
        assert!(outcome.encode_attempts >= 1);
    }

    #[test]
    fn test_attempts_are_bounded_even_under_tiny_budget() {
        let encoded = noise_jpeg(1200, 900, 95);
        // A budget nothing realistic can reach forces both phases to run
        let outcome = compress(&encoded, &options(0.001)).unwrap();

        // Quality ladder (at most 9 steps from 90 to 10) plus the initial
        // encode and one shrink pass
        assert!(outcome.encode_attempts <= 11);
        assert!(!outcome.payload.is_empty());
    }

    #[test]
    fn test_shrink_pass_reduces_dimensions() {
        let encoded = noise_jpeg(1200, 900, 95);
        let outcome = compress(&encoded, &options(0.001)).unwrap();

        assert!(outcome.payload.width < 1200);
        assert!(outcome.payload.height < 900);
    }

    #[test]
    fn test_resize_respects_bounding_box() {
        let encoded = noise_jpeg(3000, 1000, 95);
        // A budget slightly under the input size forces the re-encode path
        // while leaving the quarter-pixel resize comfortably inside it
        let opts = CompressionConfig {
            max_width_px: 1500,
            max_height_px: 1500,
            max_size_mb: encoded.len() as f64 * 0.9 / (1024.0 * 1024.0),
            quality: 0.85,
            submit_ceiling_mb: 2.0,
        };
        let outcome = compress(&encoded, &opts).unwrap();

        assert!(outcome.payload.width <= 1500);
        assert!(outcome.payload.height <= 1500);
        // Aspect ratio of 3:1 survives the bounding-box fit
        assert_eq!(outcome.payload.width, 1500);
        assert_eq!(outcome.payload.height, 500);
    }

    #[test]
    fn test_malformed_input_is_a_decode_error() {
        let garbage = vec![0u8; 4 * 1024 * 1024];
        let result = compress(&garbage, &options(2.5));
        assert!(matches!(result, Err(CompressionError::Decode { .. })));
    }

    #[test]
    fn test_malformed_but_tiny_input_passes_through() {
        // Under the skip threshold nothing is decoded, by design of the
        // early-exit: the capture is kept as-is
        let garbage = vec![1u8; 64];
        let outcome = compress(&garbage, &options(2.5)).unwrap();
        assert_eq!(outcome.encode_attempts, 0);
        assert_eq!(outcome.payload.len(), 64);
    }

    #[test]
    fn test_thumbnail_is_bounded() {
        let encoded = flat_jpeg(1920, 1080);
        let thumb = make_thumbnail(&encoded, 320).unwrap();
        assert!(thumb.width <= 320);
        assert!(thumb.height <= 320);
        assert!(!thumb.is_empty());
    }
}
