//! # Image Preprocessing Module
//!
//! Stateless pixel-matrix transforms used by the scan tiers. Every function
//! takes a grayscale image by reference and returns a new image (or an
//! estimate); inputs are never mutated.
//!
//! The module is organized into focused sub-modules:
//! - `rotation`: quarter turns and arbitrary-angle rotation
//! - `thresholding`: fixed and Otsu binarization, inversion
//! - `filtering`: Gaussian/horizontal blur and CLAHE
//! - `scaling`: integer upscaling
//! - `deskewing`: skew estimation from edge/line detection
//! - `quality`: sharpness, contrast and edge density metrics
//! - `types`: shared types and error definitions

pub mod deskewing;
pub mod filtering;
pub mod quality;
pub mod rotation;
pub mod scaling;
pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{
    BlurKind, BorderMode, Interpolation, PreprocessingError, QualityMetrics, Rotation,
    ThresholdMode,
};

pub use deskewing::estimate_skew_angle;
pub use filtering::{apply_clahe, blur};
pub use quality::{assess_quality, QualityGate};
pub use rotation::{rotate90, rotate_arbitrary};
pub use scaling::{fits_upscale_budget, upscale};
pub use thresholding::{invert, otsu_level, threshold};
