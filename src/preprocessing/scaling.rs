//! # Image Scaling Module
//!
//! Integer upscaling for small or distant barcodes. Thin bars in low-resolution
//! photos gain enough pixels per module for binarization to keep them apart.

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing;

use super::types::{Interpolation, PreprocessingError};

/// Largest accepted magnification.
pub const MAX_UPSCALE_FACTOR: u32 = 8;

/// Largest output, in pixels, `upscale` will allocate.
pub const MAX_UPSCALED_PIXELS: u64 = 64_000_000;

/// Whether upscaling a `width` x `height` image by `factor` stays within `MAX_UPSCALED_PIXELS`.
pub fn fits_upscale_budget(width: u32, height: u32, factor: u32) -> bool {
    let factor = factor as u64;
    (width as u64 * factor).saturating_mul(height as u64 * factor) <= MAX_UPSCALED_PIXELS
}

/// Upscales an image by an integer factor.
///
/// # Arguments
///
/// * `image` - The grayscale image to enlarge
/// * `factor` - Magnification between 1 and `MAX_UPSCALE_FACTOR`
/// * `interpolation` - Cubic (Catmull-Rom) or linear resampling
///
/// # Returns
///
/// Returns the enlarged image, or a `PreprocessingError` for an invalid factor
/// or an output larger than `MAX_UPSCALED_PIXELS`
pub fn upscale(
    image: &GrayImage,
    factor: u32,
    interpolation: Interpolation,
) -> Result<GrayImage, PreprocessingError> {
    if factor == 0 || factor > MAX_UPSCALE_FACTOR {
        return Err(PreprocessingError::InvalidParameter {
            message: format!(
                "Invalid upscale factor: {}. Must be between 1 and {}",
                factor, MAX_UPSCALE_FACTOR
            ),
        });
    }

    let (width, height) = image.dimensions();
    if factor == 1 || width == 0 || height == 0 {
        return Ok(image.clone());
    }

    if !fits_upscale_budget(width, height, factor) {
        return Err(PreprocessingError::InvalidParameter {
            message: format!(
                "Upscaling {}x{} by {} exceeds the {} pixel budget",
                width, height, factor, MAX_UPSCALED_PIXELS
            ),
        });
    }

    let filter = match interpolation {
        Interpolation::Cubic => FilterType::CatmullRom,
        Interpolation::Linear => FilterType::Triangle,
    };

    let start_time = std::time::Instant::now();
    let scaled = imageops::resize(image, width * factor, height * factor, filter);

    tracing::debug!(
        target: "scan_pipeline",
        "Upscaled {}x{} -> {}x{} ({:?}) in {}ms",
        width,
        height,
        scaled.width(),
        scaled.height(),
        interpolation,
        start_time.elapsed().as_millis()
    );

    Ok(scaled)
}
