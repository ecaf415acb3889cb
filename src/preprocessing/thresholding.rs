//! # Image Thresholding Module
//!
//! This module provides binary thresholding for the decode tiers: fixed
//! levels, Otsu's method for automatic level selection, and inversion.

use image::{GrayImage, Luma};
use tracing;

use super::types::ThresholdMode;

/// Binarizes an image. Pixels strictly above the level become 255, all others 0.
///
/// # Arguments
///
/// * `image` - The grayscale image to threshold
/// * `mode` - A fixed level or `ThresholdMode::Otsu`
///
/// # Examples
///
/// ```
/// use image::{GrayImage, Luma};
/// use upc_scanner::preprocessing::{threshold, ThresholdMode};
///
/// let img = GrayImage::from_pixel(4, 4, Luma([150]));
/// let binary = threshold(&img, ThresholdMode::Fixed(140));
/// assert!(binary.pixels().all(|p| p[0] == 255));
/// ```
pub fn threshold(image: &GrayImage, mode: ThresholdMode) -> GrayImage {
    let level = match mode {
        ThresholdMode::Fixed(level) => level,
        ThresholdMode::Otsu => otsu_level(image),
    };

    let mut binary = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let value = if pixel[0] > level { 255u8 } else { 0u8 };
        binary.put_pixel(x, y, Luma([value]));
    }

    tracing::trace!(
        target: "scan_pipeline",
        "Thresholded {}x{} image at level {} ({:?})",
        image.width(),
        image.height(),
        level,
        mode
    );

    binary
}

/// Swaps foreground and background.
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut inverted = image.clone();
    for pixel in inverted.pixels_mut() {
        pixel[0] = 255 - pixel[0];
    }
    inverted
}

/// Computes the Otsu level of an image.
///
/// Empty images get the mid-scale fallback of 128.
pub fn otsu_level(image: &GrayImage) -> u8 {
    let mut histogram = [0u32; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total_pixels = image.width() as f64 * image.height() as f64;
    if total_pixels == 0.0 {
        return 128;
    }

    find_otsu_threshold(&histogram, total_pixels)
}

/// Finds the optimal threshold using Otsu's method by maximizing between-class variance.
///
/// The image is assumed to hold two classes of pixels (bars and background);
/// the level that best separates them wins.
fn find_otsu_threshold(histogram: &[u32; 256], total_pixels: f64) -> u8 {
    // Pre-calculate cumulative statistics
    let mut cumulative_sums = [0f64; 256];
    let mut cumulative_weighted_sums = [0f64; 256];
    let mut cumulative_sum = 0f64;
    let mut cumulative_weighted_sum = 0f64;

    for (i, &count) in histogram.iter().enumerate() {
        cumulative_sum += count as f64;
        cumulative_weighted_sum += i as f64 * count as f64;
        cumulative_sums[i] = cumulative_sum;
        cumulative_weighted_sums[i] = cumulative_weighted_sum;
    }

    let total_weighted_sum = cumulative_weighted_sums[255];
    let mut max_variance = 0f64;
    let mut optimal_threshold = 128u8;

    for level in 0..255usize {
        let background = cumulative_sums[level];
        let foreground = total_pixels - background;

        // Avoid division by zero
        if background == 0.0 || foreground == 0.0 {
            continue;
        }

        let w0 = background / total_pixels;
        let w1 = foreground / total_pixels;
        let mu0 = cumulative_weighted_sums[level] / background;
        let mu1 = (total_weighted_sum - cumulative_weighted_sums[level]) / foreground;

        let variance = w0 * w1 * (mu0 - mu1).powi(2);
        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = level as u8;
        }
    }

    optimal_threshold
}
