//! # Image Rotation Module
//!
//! Quarter-turn rotations (exact pixel remaps) and arbitrary-angle rotation
//! about the image center with bilinear sampling.

use image::{imageops, GrayImage, Luma};

use super::types::{BorderMode, Rotation};

/// Rotates an image clockwise by a quarter-turn multiple.
///
/// 90° and 270° swap width and height. No pixel values are interpolated.
pub fn rotate90(image: &GrayImage, rotation: Rotation) -> GrayImage {
    match rotation {
        Rotation::Deg0 => image.clone(),
        Rotation::Deg90 => imageops::rotate90(image),
        Rotation::Deg180 => imageops::rotate180(image),
        Rotation::Deg270 => imageops::rotate270(image),
    }
}

/// Rotates an image about its center by `angle_degrees`.
///
/// Positive angles rotate the content counter-clockwise as seen on screen.
/// The output keeps the input dimensions, so corners are cut off and the
/// uncovered area is filled according to `border`.
///
/// # Arguments
///
/// * `image` - The input image to rotate
/// * `angle_degrees` - Rotation angle in degrees (positive = counter-clockwise)
/// * `border` - Fill strategy for samples that fall outside the source frame
pub fn rotate_arbitrary(image: &GrayImage, angle_degrees: f32, border: BorderMode) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || angle_degrees == 0.0 {
        return image.clone();
    }

    let angle_rad = angle_degrees.to_radians();
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    let mut output = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;

            // Inverse mapping: where does this output pixel come from?
            let src_x = dx * cos_a - dy * sin_a + cx;
            let src_y = dx * sin_a + dy * cos_a + cy;

            let value = sample_bilinear(image, src_x, src_y, border);
            output.put_pixel(x, y, Luma([value]));
        }
    }

    tracing::trace!(
        target: "scan_pipeline",
        "Rotated {}x{} image by {:.2}°",
        width,
        height,
        angle_degrees
    );

    output
}

/// Bilinear sample at a fractional position, honoring the border mode.
fn sample_bilinear(image: &GrayImage, x: f32, y: f32, border: BorderMode) -> u8 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as i64;
    let y0 = y0 as i64;

    let p00 = pixel_at(image, x0, y0, border);
    let p10 = pixel_at(image, x0 + 1, y0, border);
    let p01 = pixel_at(image, x0, y0 + 1, border);
    let p11 = pixel_at(image, x0 + 1, y0 + 1, border);

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

fn pixel_at(image: &GrayImage, x: i64, y: i64, border: BorderMode) -> f32 {
    let (width, height) = image.dimensions();
    let inside = x >= 0 && y >= 0 && x < width as i64 && y < height as i64;

    match border {
        _ if inside => image.get_pixel(x as u32, y as u32)[0] as f32,
        BorderMode::Constant(value) => value as f32,
        BorderMode::Replicate => {
            let cx = x.clamp(0, width as i64 - 1) as u32;
            let cy = y.clamp(0, height as i64 - 1) as u32;
            image.get_pixel(cx, cy)[0] as f32
        }
    }
}
