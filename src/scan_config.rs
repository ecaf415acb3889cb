//! # Scan Configuration Module
//!
//! This module defines configuration structures for the scan pipeline:
//! image normalization, the quality gate, and the tier parameters used by the
//! orchestrator. Every empirically tuned constant lives here as a named,
//! overridable value.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::preprocessing::Rotation;

// Constants for scan configuration
pub const DEFAULT_CLAHE_CLIP_LIMIT: f32 = 2.0;
pub const DEFAULT_CLAHE_GRID: (u32, u32) = (8, 8);
pub const DEFAULT_CROP_PADDING_RATIO: f32 = 0.15;
pub const DEFAULT_RIGHT_EXTRA_PADDING_RATIO: f32 = 0.30;
pub const DEFAULT_MAX_CROP_AREA_RATIO: f32 = 0.60;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024; // 10MB limit for uploads
pub const MAX_IMAGE_DIMENSION: u32 = 16_384;
pub const MAX_IMAGE_PIXELS: u64 = 40_000_000;

/// Settings for turning raw bytes into the original/enhanced/cropped triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// CLAHE clip limit, relative to a uniform histogram
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid as (columns, rows)
    pub clahe_grid: (u32, u32),
    /// Padding added on every side of a detected region, as a fraction of its size
    pub crop_padding_ratio: f32,
    /// Extra padding on the right side, as a fraction of the region width.
    /// Supplemental extensions are printed to the right of the main symbol.
    pub right_extra_padding_ratio: f32,
    /// Crops covering more than this fraction of the frame are discarded
    pub max_crop_area_ratio: f32,
    /// Largest accepted payload in bytes
    pub max_image_bytes: usize,
    /// Largest accepted width or height, checked before pixel data is decoded
    pub max_image_dimension: u32,
    /// Largest accepted width * height
    pub max_image_pixels: u64,
    /// Directory for intermediate debug images; `None` disables them
    pub debug_dir: Option<PathBuf>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: DEFAULT_CLAHE_CLIP_LIMIT,
            clahe_grid: DEFAULT_CLAHE_GRID,
            crop_padding_ratio: DEFAULT_CROP_PADDING_RATIO,
            right_extra_padding_ratio: DEFAULT_RIGHT_EXTRA_PADDING_RATIO,
            max_crop_area_ratio: DEFAULT_MAX_CROP_AREA_RATIO,
            max_image_bytes: MAX_IMAGE_BYTES,
            max_image_dimension: MAX_IMAGE_DIMENSION,
            max_image_pixels: MAX_IMAGE_PIXELS,
            debug_dir: None,
        }
    }
}

impl NormalizerConfig {
    /// Validate normalizer configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.clahe_clip_limit <= 0.0 {
            return Err(AppError::Config(format!(
                "clahe_clip_limit must be greater than 0 (got {})",
                self.clahe_clip_limit
            )));
        }
        if self.clahe_grid.0 == 0 || self.clahe_grid.1 == 0 {
            return Err(AppError::Config(
                "clahe_grid dimensions must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.crop_padding_ratio) {
            return Err(AppError::Config(format!(
                "crop_padding_ratio must be within 0.0-1.0 (got {})",
                self.crop_padding_ratio
            )));
        }
        if !(0.0..=2.0).contains(&self.right_extra_padding_ratio) {
            return Err(AppError::Config(format!(
                "right_extra_padding_ratio must be within 0.0-2.0 (got {})",
                self.right_extra_padding_ratio
            )));
        }
        if self.max_crop_area_ratio <= 0.0 || self.max_crop_area_ratio > 1.0 {
            return Err(AppError::Config(format!(
                "max_crop_area_ratio must be within (0.0, 1.0] (got {})",
                self.max_crop_area_ratio
            )));
        }
        if self.max_image_bytes == 0 {
            return Err(AppError::Config(
                "max_image_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_image_dimension == 0 || self.max_image_pixels == 0 {
            return Err(AppError::Config(
                "max_image_dimension and max_image_pixels must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Thresholds for the scannable/unscannable verdict.
///
/// The values are empirical gates. The verdict requires all three to pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateConfig {
    /// Minimum Laplacian variance
    pub min_blur_score: f64,
    /// Minimum intensity standard deviation
    pub min_contrast: f64,
    /// Minimum fraction of edge pixels
    pub min_edge_density: f64,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_blur_score: 50.0,
            min_contrast: 20.0,
            min_edge_density: 0.01,
        }
    }
}

impl QualityGateConfig {
    /// Validate quality gate thresholds
    pub fn validate(&self) -> AppResult<()> {
        if self.min_blur_score < 0.0 || self.min_contrast < 0.0 {
            return Err(AppError::Config(
                "quality gate thresholds cannot be negative".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.min_edge_density) {
            return Err(AppError::Config(format!(
                "min_edge_density must be within 0.0-1.0 (got {})",
                self.min_edge_density
            )));
        }
        Ok(())
    }
}

/// Parameters of the edge/line based skew estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkewConfig {
    /// Canny low hysteresis threshold
    pub canny_low: f32,
    /// Canny high hysteresis threshold
    pub canny_high: f32,
    /// Minimum Hough votes for a line to be reported
    pub vote_threshold: u32,
    /// Non-maximum suppression radius in Hough space
    pub suppression_radius: u32,
    /// Lines further than this from vertical are ignored (degrees)
    pub max_deviation_degrees: f32,
    /// Estimates with a smaller magnitude are reported as "no skew" (degrees)
    pub min_angle_degrees: f32,
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            vote_threshold: 100,
            suppression_radius: 8,
            max_deviation_degrees: 30.0,
            min_angle_degrees: 0.5,
        }
    }
}

/// Tier parameters for the scan orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Rotations tried on every full-frame and crop candidate
    pub rotations: Vec<Rotation>,
    /// Fixed thresholds for the thresholding tier
    pub fixed_thresholds: Vec<u8>,
    /// Small-angle corrections (degrees, counter-clockwise positive)
    pub small_angles: Vec<f32>,
    /// Fill value for pixels uncovered by small-angle corrections
    pub small_angle_fill: u8,
    /// Rotations used by the deep processing tier
    pub deep_rotations: Vec<Rotation>,
    /// Fixed thresholds of the deep processing cascade, in order
    pub deep_thresholds: Vec<u8>,
    /// Images narrower than this are upscaled before deep processing
    pub upscale_below_width: u32,
    /// Integer magnification used by deep processing
    pub upscale_factor: u32,
    /// Skew estimator settings
    pub skew: SkewConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rotations: Rotation::ALL.to_vec(),
            fixed_thresholds: vec![140, 160, 180],
            small_angles: vec![-5.0, -3.0, 3.0, 5.0],
            small_angle_fill: 255,
            deep_rotations: vec![Rotation::Deg0, Rotation::Deg90],
            deep_thresholds: vec![140, 160, 180, 120],
            upscale_below_width: 400,
            upscale_factor: 4,
            skew: SkewConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Validate tier parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.rotations.is_empty() {
            return Err(AppError::Config(
                "rotations must contain at least one entry".to_string(),
            ));
        }
        if self.upscale_factor == 0 || self.upscale_factor > 8 {
            return Err(AppError::Config(format!(
                "upscale_factor must be within 1-8 (got {})",
                self.upscale_factor
            )));
        }
        if self.small_angles.iter().any(|a| a.abs() > 45.0) {
            return Err(AppError::Config(
                "small_angles must stay within ±45 degrees".to_string(),
            ));
        }
        if self.skew.canny_low > self.skew.canny_high {
            return Err(AppError::Config(format!(
                "canny_low ({}) must be <= canny_high ({})",
                self.skew.canny_low, self.skew.canny_high
            )));
        }
        if !(0.0..=90.0).contains(&self.skew.max_deviation_degrees) {
            return Err(AppError::Config(
                "max_deviation_degrees must be within 0-90".to_string(),
            ));
        }
        Ok(())
    }
}
