//! # Shared Types for Image Preprocessing
//!
//! This module contains the shared types, enums, and errors used across
//! the preprocessing sub-modules.

use serde::{Deserialize, Serialize};

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessingError {
    /// A transform parameter is outside its accepted range
    InvalidParameter { message: String },
    /// The input image has no pixels
    EmptyImage,
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::InvalidParameter { message } => {
                write!(f, "Invalid preprocessing parameter: {}", message)
            }
            PreprocessingError::EmptyImage => write!(f, "Image has no pixels"),
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// Quarter-turn rotations, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Every quarter turn, in the order tiers try them.
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    /// Clockwise angle in degrees.
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// How pixels outside the source frame are filled by arbitrary-angle rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderMode {
    /// Use the nearest edge pixel
    Replicate,
    /// Use a fixed intensity
    Constant(u8),
}

/// Binarization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Pixels strictly above the level become white
    Fixed(u8),
    /// Level chosen by maximizing between-class variance
    Otsu,
}

/// Smoothing kernels used before binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurKind {
    /// Small isotropic Gaussian, equivalent to a 3x3 kernel
    Gaussian,
    /// 5x1 horizontal box mean; smears across bars, never along them
    Horizontal,
}

/// Resampling filter for upscaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Catmull-Rom cubic
    Cubic,
    /// Bilinear (triangle)
    Linear,
}

/// Result of image quality assessment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Variance of the Laplacian response (higher is sharper)
    pub blur_score: f64,
    /// Standard deviation of pixel intensity
    pub contrast: f64,
    /// Fraction of pixels marked as edges (0.0-1.0)
    pub edge_density: f64,
    /// Conjunctive verdict over the three metrics
    pub scannable: bool,
}
