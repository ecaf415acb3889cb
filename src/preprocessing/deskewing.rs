//! # Skew Estimation Module
//!
//! Estimates how far the bars of a barcode lean away from vertical. Edges are
//! extracted with Canny, straight lines are found with a Hough transform, and
//! the median deviation of the near-vertical lines is reported.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions};
use tracing;

use crate::scan_config::SkewConfig;

/// Estimates the skew angle of the bars in an image.
///
/// Hough normal angles are measured in `[0, 180)`; a perfectly vertical line
/// has angle 0. Angles below `max_deviation_degrees` are kept as-is and angles
/// above `180 - max_deviation_degrees` are mapped to negative deviations.
///
/// Rotating the image by the returned angle with
/// [`rotate_arbitrary`](super::rotation::rotate_arbitrary) straightens the bars.
///
/// # Returns
///
/// `None` when no qualifying line is found or the median magnitude is below
/// `min_angle_degrees`.
pub fn estimate_skew_angle(image: &GrayImage, config: &SkewConfig) -> Option<f32> {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return None;
    }

    let edges = canny(image, config.canny_low, config.canny_high);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: config.vote_threshold,
            suppression_radius: config.suppression_radius,
        },
    );

    let mut deviations: Vec<f32> = lines
        .iter()
        .filter_map(|line| {
            vertical_deviation(line.angle_in_degrees as f32, config.max_deviation_degrees)
        })
        .collect();

    if deviations.is_empty() {
        tracing::debug!(
            target: "scan_pipeline",
            "No near-vertical lines among {} detected lines",
            lines.len()
        );
        return None;
    }

    let skew = median(&mut deviations);

    tracing::debug!(
        target: "scan_pipeline",
        "Skew estimate {:.2}° from {} near-vertical lines",
        skew,
        deviations.len()
    );

    if skew.abs() < config.min_angle_degrees {
        return None;
    }

    Some(skew)
}

/// Signed deviation from vertical of a Hough normal angle, if within range.
fn vertical_deviation(angle_degrees: f32, max_deviation: f32) -> Option<f32> {
    if angle_degrees < max_deviation {
        Some(angle_degrees)
    } else if angle_degrees > 180.0 - max_deviation {
        Some(angle_degrees - 180.0)
    } else {
        None
    }
}

/// Median of a non-empty slice; even counts average the two middle values.
fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
