use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;

use crate::errors::ResizeError;

/// Every resize pass re-encodes to this lossless format
pub const OUTPUT_FORMAT: ImageFormat = ImageFormat::Png;

const AGGRESSIVE_SCALE: f64 = 0.75;
const GENTLE_SCALE: f64 = 0.9;
const SETTLED_SCALE: f64 = 0.8;
const SETTLE_AFTER_PASSES: u32 = 5;
const MAX_PASSES: u32 = 20;
const MIN_WIDTH: u32 = 100;

/// Dimension sequence tried while shrinking an image.
///
/// The first pass keeps the natural size. Each later pass multiplies both
/// sides by the current factor: 0.75 when the original is more than twice the
/// budget, 0.9 otherwise, and 0.8 once more than five passes have run.
#[derive(Debug, Clone)]
pub struct ScaleSchedule {
    width: u32,
    height: u32,
    scale: f64,
    passes: u32,
}

impl ScaleSchedule {
    pub fn new(width: u32, height: u32, original_size: u64, max_bytes: u64) -> Self {
        let scale = if original_size > max_bytes.saturating_mul(2) {
            AGGRESSIVE_SCALE
        } else {
            GENTLE_SCALE
        };

        Self {
            width,
            height,
            scale,
            passes: 0,
        }
    }

    pub fn next_dimensions(&mut self) -> (u32, u32) {
        if self.passes > 0 {
            self.width = shrink(self.width, self.scale);
            self.height = shrink(self.height, self.scale);
            if self.passes > SETTLE_AFTER_PASSES {
                self.scale = SETTLED_SCALE;
            }
        }
        self.passes += 1;
        (self.width, self.height)
    }

    /// True once another pass would be pointless or too many have run
    pub fn should_stop(&self) -> bool {
        self.passes > MAX_PASSES || self.width < MIN_WIDTH
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

fn shrink(side: u32, scale: f64) -> u32 {
    ((side as f64 * scale).floor() as u32).max(1)
}

#[derive(Debug, Clone)]
pub struct ResizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub passes: u32,
}

/// Re-encode `image` until it fits in `max_bytes`, shrinking it as needed.
///
/// Output is always PNG, even on the first full-size pass. Only PNGs written
/// by this encoder come back byte-identical; a small JPEG can grow past the
/// budget and get shrunk, so only call this for files that are already too big.
pub async fn fit_to_size(image: &[u8], max_bytes: u64) -> Result<ResizedImage, ResizeError> {
    let original_size = image.len() as u64;
    let owned = image.to_vec();

    let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&owned))
        .await
        .map_err(|e| ResizeError::Task(e.to_string()))?
        .map_err(ResizeError::Decode)?;
    let decoded = Arc::new(decoded);

    log::info!(
        "Fitting {}x{} image ({} bytes) into {} bytes",
        decoded.width(),
        decoded.height(),
        original_size,
        max_bytes
    );

    let mut schedule =
        ScaleSchedule::new(decoded.width(), decoded.height(), original_size, max_bytes);

    loop {
        let (width, height) = schedule.next_dimensions();
        let source = Arc::clone(&decoded);

        let encoded = tokio::task::spawn_blocking(move || render(&source, width, height))
            .await
            .map_err(|e| ResizeError::Task(e.to_string()))?
            .map_err(ResizeError::Encode)?;
        let encoded_size = encoded.len() as u64;

        log::debug!(
            "Resize pass {}: {}x{} -> {} bytes (scale {})",
            schedule.passes(),
            width,
            height,
            encoded_size,
            schedule.scale()
        );

        if encoded_size <= max_bytes {
            return Ok(ResizedImage {
                bytes: encoded,
                width,
                height,
                passes: schedule.passes(),
            });
        }

        if schedule.should_stop() {
            log::warn!(
                "Could not fit image into {} bytes after {} passes (last {} bytes)",
                max_bytes,
                schedule.passes(),
                encoded_size
            );
            return Err(ResizeError::TargetUnreachable {
                passes: schedule.passes(),
                best_size: encoded_size,
            });
        }
    }
}

fn render(source: &DynamicImage, width: u32, height: u32) -> Result<Vec<u8>, image::ImageError> {
    let resized = if (width, height) == (source.width(), source.height()) {
        None
    } else {
        Some(source.resize_exact(width, height, FilterType::Lanczos3))
    };
    let frame = resized.as_ref().unwrap_or(source);

    let mut output = Vec::new();
    match frame {
        // PNG has no float pixel layout
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(frame.to_rgba8())
                .write_to(&mut Cursor::new(&mut output), OUTPUT_FORMAT)?;
        }
        _ => frame.write_to(&mut Cursor::new(&mut output), OUTPUT_FORMAT)?,
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Noise compresses badly, which keeps PNG sizes predictable
    fn noise_png(width: u32, height: u32) -> Vec<u8> {
        let mut seed: u32 = 0x1234_5678;
        let img = RgbImage::from_fn(width, height, |_, _| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let b = seed.to_be_bytes();
            Rgb([b[0], b[1], b[2]])
        });

        let mut output = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .unwrap();
        output
    }

    #[test]
    fn test_schedule_aggressive_start() {
        let mut schedule = ScaleSchedule::new(1000, 500, 300, 100);
        assert_eq!(schedule.next_dimensions(), (1000, 500));
        assert_eq!(schedule.next_dimensions(), (750, 375));
        assert_eq!(schedule.next_dimensions(), (562, 281));
        assert_eq!(schedule.passes(), 3);
    }

    #[test]
    fn test_schedule_gentle_start() {
        let mut schedule = ScaleSchedule::new(1000, 1000, 150, 100);
        schedule.next_dimensions();
        assert_eq!(schedule.next_dimensions(), (900, 900));
    }

    #[test]
    fn test_schedule_settles_at_point_eight() {
        let mut schedule = ScaleSchedule::new(10_000, 10_000, 300, 100);
        for _ in 0..6 {
            schedule.next_dimensions();
        }
        assert_eq!(schedule.scale(), 0.75);

        schedule.next_dimensions();
        assert_eq!(schedule.scale(), 0.8);
    }

    #[test]
    fn test_schedule_never_exceeds_twenty_one_passes() {
        let mut schedule = ScaleSchedule::new(1_000_000, 1_000_000, 300, 100);
        let mut passes = 0;
        loop {
            schedule.next_dimensions();
            passes += 1;
            if schedule.should_stop() {
                break;
            }
        }
        assert_eq!(passes, 21);
    }

    #[test]
    fn test_schedule_keeps_sides_positive() {
        let mut schedule = ScaleSchedule::new(100_000, 1, 300, 100);
        schedule.next_dimensions();
        assert_eq!(schedule.next_dimensions(), (75_000, 1));
    }

    #[tokio::test]
    async fn test_fit_shrinks_oversized_image() {
        let original = noise_png(400, 400);
        let max_bytes = 150_000;
        assert!(original.len() as u64 > max_bytes * 2);

        let resized = fit_to_size(&original, max_bytes).await.unwrap();

        assert!(resized.bytes.len() as u64 <= max_bytes);
        assert!(resized.width < 400);
        assert!(resized.passes >= 2 && resized.passes <= 5);

        let decoded = image::load_from_memory(&resized.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (resized.width, resized.height));
        assert_eq!(image::guess_format(&resized.bytes).unwrap(), ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_fit_is_identity_for_small_png() {
        let original = noise_png(120, 80);

        let resized = fit_to_size(&original, 10 * 1024 * 1024).await.unwrap();

        assert_eq!(resized.passes, 1);
        assert_eq!((resized.width, resized.height), (120, 80));
        assert_eq!(resized.bytes, original);
    }

    #[tokio::test]
    async fn test_fit_reencodes_small_jpeg_as_png() {
        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();

        let resized = fit_to_size(&jpeg, 10 * 1024 * 1024).await.unwrap();

        assert_eq!(resized.passes, 1);
        assert_eq!((resized.width, resized.height), (64, 48));
        assert_ne!(resized.bytes, jpeg);
        assert_eq!(image::guess_format(&resized.bytes).unwrap(), ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_fit_gives_up_below_minimum_width() {
        let original = noise_png(260, 260);

        match fit_to_size(&original, 1_000).await {
            Err(ResizeError::TargetUnreachable { passes, best_size }) => {
                // 260 -> 195 -> 146 -> 109 -> 81
                assert_eq!(passes, 5);
                assert!(best_size > 1_000);
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.passes)),
        }
    }

    #[tokio::test]
    async fn test_fit_rejects_garbage() {
        let result = fit_to_size(b"definitely not an image", 1_000).await;
        assert!(matches!(result, Err(ResizeError::Decode(_))));
    }
}
