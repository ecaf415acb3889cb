//! # Image Quality Assessment Module
//!
//! Sharpness, contrast and edge density of an incoming image, plus the
//! scannable/unscannable verdict the orchestrator uses to skip its most
//! expensive tiers on hopeless inputs.

use image::GrayImage;
use imageproc::edges::canny;
use tracing;

use super::types::QualityMetrics;
use crate::scan_config::QualityGateConfig;

const EDGE_CANNY_LOW: f32 = 50.0;
const EDGE_CANNY_HIGH: f32 = 150.0;

/// Verdict policy over [`QualityMetrics`].
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    config: QualityGateConfig,
}

impl QualityGate {
    pub fn new(config: QualityGateConfig) -> Self {
        Self { config }
    }

    /// Computes the metrics of `image` and applies the verdict.
    pub fn assess(&self, image: &GrayImage) -> QualityMetrics {
        assess_quality(image, &self.config)
    }
}

/// Assesses an image against the configured quality thresholds.
///
/// All three metrics must strictly exceed their thresholds for the image to be
/// considered scannable.
///
/// # Examples
///
/// ```
/// use image::{GrayImage, Luma};
/// use upc_scanner::preprocessing::assess_quality;
/// use upc_scanner::scan_config::QualityGateConfig;
///
/// let gray = GrayImage::from_pixel(64, 64, Luma([128]));
/// let metrics = assess_quality(&gray, &QualityGateConfig::default());
/// assert!(!metrics.scannable);
/// ```
pub fn assess_quality(image: &GrayImage, config: &QualityGateConfig) -> QualityMetrics {
    let start_time = std::time::Instant::now();

    let blur_score = laplacian_variance(image);
    let contrast = intensity_std_dev(image);
    let edge_density = edge_density(image);

    let scannable = blur_score > config.min_blur_score
        && contrast > config.min_contrast
        && edge_density > config.min_edge_density;

    tracing::debug!(
        target: "scan_pipeline",
        "Quality assessment completed in {}ms: blur={:.1}, contrast={:.1}, edge_density={:.4}, scannable={}",
        start_time.elapsed().as_millis(),
        blur_score,
        contrast,
        edge_density,
        scannable
    );

    QualityMetrics {
        blur_score,
        contrast,
        edge_density,
        scannable,
    }
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    let mut count = 0f64;

    // Laplacian kernel: [[0, 1, 0], [1, -4, 1], [0, 1, 0]]
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = image.get_pixel(x, y)[0] as f64;
            let top = image.get_pixel(x, y - 1)[0] as f64;
            let bottom = image.get_pixel(x, y + 1)[0] as f64;
            let left = image.get_pixel(x - 1, y)[0] as f64;
            let right = image.get_pixel(x + 1, y)[0] as f64;

            let laplacian = top + bottom + left + right - 4.0 * center;
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1.0;
        }
    }

    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Population standard deviation of pixel intensities.
fn intensity_std_dev(image: &GrayImage) -> f64 {
    let count = image.width() as f64 * image.height() as f64;
    if count == 0.0 {
        return 0.0;
    }

    let mean = image.pixels().map(|p| p[0] as f64).sum::<f64>() / count;
    let variance = image
        .pixels()
        .map(|p| (p[0] as f64 - mean).powi(2))
        .sum::<f64>()
        / count;

    variance.sqrt()
}

/// Fraction of pixels Canny marks as edges.
fn edge_density(image: &GrayImage) -> f64 {
    let count = image.width() as f64 * image.height() as f64;
    if count == 0.0 {
        return 0.0;
    }

    let edges = canny(image, EDGE_CANNY_LOW, EDGE_CANNY_HIGH);
    let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count() as f64;
    edge_pixels / count
}
