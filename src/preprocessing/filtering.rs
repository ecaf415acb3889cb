//! # Image Filtering Module
//!
//! This module provides the smoothing filters applied before binarization and
//! contrast-limited adaptive histogram equalization (CLAHE) for local contrast
//! enhancement.

use image::{GrayImage, Luma};
use imageproc::filter::{box_filter, gaussian_blur_f32};
use tracing;

use super::types::{BlurKind, PreprocessingError};

/// Sigma giving a kernel equivalent to a 3x3 Gaussian.
const GAUSSIAN_SIGMA: f32 = 0.8;

/// Horizontal box radius; 2 gives a 5x1 window.
const HORIZONTAL_RADIUS: u32 = 2;

/// Smooths an image with the requested kernel.
///
/// `BlurKind::Horizontal` averages along rows only, which closes small gaps in
/// printed bars without merging neighbouring bars vertically.
pub fn blur(image: &GrayImage, kind: BlurKind) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    match kind {
        BlurKind::Gaussian => gaussian_blur_f32(image, GAUSSIAN_SIGMA),
        BlurKind::Horizontal => box_filter(image, HORIZONTAL_RADIUS, 0),
    }
}

/// Applies CLAHE (Contrast Limited Adaptive Histogram Equalization) to enhance local contrast.
///
/// The image is split into a `grid` of tiles. Each tile gets its own clipped
/// histogram equalization mapping, and every pixel is remapped by bilinearly
/// interpolating the mappings of the four nearest tile centers, so no tile
/// seams appear in the output.
///
/// # Arguments
///
/// * `image` - The grayscale image to enhance
/// * `clip_limit` - Histogram clip limit relative to a uniform distribution (typically 2.0)
/// * `grid` - Number of tiles as (columns, rows), typically (8, 8)
///
/// # Returns
///
/// Returns the enhanced image, or a `PreprocessingError` for invalid parameters or an empty image
pub fn apply_clahe(
    image: &GrayImage,
    clip_limit: f32,
    grid: (u32, u32),
) -> Result<GrayImage, PreprocessingError> {
    let start_time = std::time::Instant::now();

    // Validate parameters
    if clip_limit <= 0.0 {
        return Err(PreprocessingError::InvalidParameter {
            message: format!("Invalid clip limit: {}. Must be > 0.0", clip_limit),
        });
    }

    if grid.0 == 0 || grid.1 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            message: "Invalid tile grid: dimensions must be > 0".to_string(),
        });
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessingError::EmptyImage);
    }

    // Never more tiles than pixels along an axis
    let tiles_x = grid.0.min(width) as usize;
    let tiles_y = grid.1.min(height) as usize;

    let x_bounds = tile_bounds(width, tiles_x);
    let y_bounds = tile_bounds(height, tiles_y);

    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for &(y_start, y_end) in &y_bounds {
        for &(x_start, x_end) in &x_bounds {
            luts.push(tile_lut(image, x_start, x_end, y_start, y_end, clip_limit));
        }
    }

    let tile_width = width as f32 / tiles_x as f32;
    let tile_height = height as f32 / tiles_y as f32;

    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        let (ty0, ty1, wy) =
            interpolation_neighbors((y as f32 + 0.5) / tile_height - 0.5, tiles_y);

        for x in 0..width {
            let (tx0, tx1, wx) =
                interpolation_neighbors((x as f32 + 0.5) / tile_width - 0.5, tiles_x);

            let value = image.get_pixel(x, y)[0] as usize;
            let m00 = luts[ty0 * tiles_x + tx0][value] as f32;
            let m10 = luts[ty0 * tiles_x + tx1][value] as f32;
            let m01 = luts[ty1 * tiles_x + tx0][value] as f32;
            let m11 = luts[ty1 * tiles_x + tx1][value] as f32;

            let top = m00 * (1.0 - wx) + m10 * wx;
            let bottom = m01 * (1.0 - wx) + m11 * wx;
            let mapped = (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8;

            output.put_pixel(x, y, Luma([mapped]));
        }
    }

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "scan_pipeline",
        "CLAHE applied in {}ms: clip_limit={}, grid={}x{}",
        processing_time.as_millis(),
        clip_limit,
        tiles_x,
        tiles_y
    );

    Ok(output)
}

/// Splits `length` pixels into `count` contiguous half-open ranges.
fn tile_bounds(length: u32, count: usize) -> Vec<(u32, u32)> {
    (0..count)
        .map(|i| {
            let start = (i as u64 * length as u64 / count as u64) as u32;
            let end = ((i as u64 + 1) * length as u64 / count as u64) as u32;
            (start, end)
        })
        .collect()
}

/// Lower/upper tile index and the weight of the upper one for a position in tile units.
///
/// Pixels before the first tile center or past the last one use a single tile.
fn interpolation_neighbors(position: f32, count: usize) -> (usize, usize, f32) {
    if position <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = position.floor() as usize;
    if lower >= count - 1 {
        return (count - 1, count - 1, 0.0);
    }
    (lower, lower + 1, position - lower as f32)
}

/// Builds the clipped-equalization lookup table of a single tile.
fn tile_lut(
    image: &GrayImage,
    x_start: u32,
    x_end: u32,
    y_start: u32,
    y_end: u32,
    clip_limit: f32,
) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y_start..y_end {
        for x in x_start..x_end {
            histogram[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let total_pixels = ((x_end - x_start) * (y_end - y_start)).max(1);

    // Apply clip limit
    let clip_limit_pixels = ((clip_limit * total_pixels as f32 / 256.0) as u32).max(1);
    let mut excess_pixels = 0u32;
    for count in &mut histogram {
        if *count > clip_limit_pixels {
            excess_pixels += *count - clip_limit_pixels;
            *count = clip_limit_pixels;
        }
    }

    // Redistribute excess pixels uniformly
    let uniform_increment = excess_pixels / 256;
    let mut remainder = excess_pixels % 256;
    for count in &mut histogram {
        *count += uniform_increment;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }

    // Cumulative distribution mapped onto 0-255
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    let scale = 255.0 / total_pixels as f32;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        lut[value] = (cumulative as f32 * scale).round().min(255.0) as u8;
    }

    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_uniform_image(width: u32, height: u32, intensity: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([intensity]))
    }

    fn create_striped_image(width: u32, height: u32, dark: u8, bright: u8) -> GrayImage {
        let mut img = GrayImage::new(width, height);
        for (x, _y, pixel) in img.enumerate_pixels_mut() {
            pixel[0] = if x % 2 == 0 { dark } else { bright };
        }
        img
    }

    #[test]
    fn test_blur_preserves_dimensions() {
        let img = create_striped_image(30, 20, 0, 255);
        assert_eq!(blur(&img, BlurKind::Gaussian).dimensions(), (30, 20));
        assert_eq!(blur(&img, BlurKind::Horizontal).dimensions(), (30, 20));
    }

    #[test]
    fn test_horizontal_blur_smears_rows_only() {
        // Horizontal stripes: every row is uniform
        let mut img = GrayImage::new(20, 20);
        for (_x, y, pixel) in img.enumerate_pixels_mut() {
            pixel[0] = if y % 2 == 0 { 0 } else { 255 };
        }
        let blurred = blur(&img, BlurKind::Horizontal);
        assert_eq!(blurred, img);
    }

    #[test]
    fn test_horizontal_blur_averages_vertical_bars() {
        let img = create_striped_image(20, 4, 0, 255);
        let blurred = blur(&img, BlurKind::Horizontal);
        let center = blurred.get_pixel(10, 2)[0];
        assert!(center > 50 && center < 205, "center value {}", center);
    }

    #[test]
    fn test_gaussian_blur_keeps_uniform_image() {
        let img = create_uniform_image(16, 16, 90);
        let blurred = blur(&img, BlurKind::Gaussian);
        assert!(blurred.pixels().all(|p| (89..=90).contains(&p[0])));
    }

    #[test]
    fn test_apply_clahe_basic() {
        let img = create_striped_image(64, 64, 90, 160);
        let enhanced = apply_clahe(&img, 2.0, (8, 8)).expect("CLAHE should succeed");
        assert_eq!(enhanced.dimensions(), (64, 64));
    }

    #[test]
    fn test_apply_clahe_uniform_stays_uniform() {
        let img = create_uniform_image(64, 48, 128);
        let enhanced = apply_clahe(&img, 2.0, (8, 8)).expect("CLAHE should succeed");
        let first = enhanced.get_pixel(0, 0)[0];
        assert!(enhanced.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_apply_clahe_preserves_order() {
        let img = create_striped_image(256, 256, 90, 160);
        let enhanced = apply_clahe(&img, 2.0, (8, 8)).expect("CLAHE should succeed");
        for y in [0, 100, 255] {
            let dark = enhanced.get_pixel(100, y)[0];
            let bright = enhanced.get_pixel(101, y)[0];
            assert!(dark < bright, "dark {} should stay below bright {}", dark, bright);
        }
    }

    #[test]
    fn test_apply_clahe_invalid_parameters() {
        let img = create_uniform_image(16, 16, 10);
        assert!(apply_clahe(&img, 0.0, (8, 8)).is_err());
        assert!(apply_clahe(&img, 2.0, (0, 8)).is_err());
        assert_eq!(
            apply_clahe(&GrayImage::new(0, 0), 2.0, (8, 8)),
            Err(PreprocessingError::EmptyImage)
        );
    }

    #[test]
    fn test_apply_clahe_grid_larger_than_image() {
        let img = create_striped_image(4, 3, 20, 200);
        let enhanced = apply_clahe(&img, 2.0, (8, 8)).expect("CLAHE should shrink the grid");
        assert_eq!(enhanced.dimensions(), (4, 3));
    }

    #[test]
    fn test_tile_bounds_cover_length() {
        let bounds = tile_bounds(10, 3);
        assert_eq!(bounds, vec![(0, 3), (3, 6), (6, 10)]);
    }

    #[test]
    fn test_interpolation_neighbors() {
        assert_eq!(interpolation_neighbors(-0.3, 8), (0, 0, 0.0));
        assert_eq!(interpolation_neighbors(7.2, 8), (7, 7, 0.0));
        let (lower, upper, weight) = interpolation_neighbors(2.25, 8);
        assert_eq!((lower, upper), (2, 3));
        assert!((weight - 0.25).abs() < 1e-6);
    }
}
