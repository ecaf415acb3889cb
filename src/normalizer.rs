//! # Image Normalizer
//!
//! Turns an uploaded payload into the three views the scan tiers work on: the
//! full-resolution grayscale original, a CLAHE-enhanced copy, and an optional
//! padded crop around the localized barcode.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{imageops, GrayImage, ImageReader, Limits};
use tracing;

use crate::errors::{error_logging, ScanError};
use crate::preprocessing::apply_clahe;
use crate::region::{Region, RegionDetector};
use crate::scan_config::NormalizerConfig;

/// Output of normalization. Read-only once produced.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Grayscale original at full resolution
    pub original: GrayImage,
    /// Contrast-enhanced original
    pub enhanced: GrayImage,
    /// Padded crop around the localized barcode, if one was accepted
    pub cropped: Option<GrayImage>,
    /// Frame coordinates of `cropped`
    pub crop_region: Option<Region>,
}

/// Produces [`NormalizedImage`]s from raw bytes.
#[derive(Clone)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
    detector: Arc<dyn RegionDetector>,
}

impl ImageNormalizer {
    pub fn new(config: NormalizerConfig, detector: Arc<dyn RegionDetector>) -> Self {
        Self { config, detector }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Decodes raw bytes and normalizes the resulting image.
    ///
    /// Empty, oversized, and undecodable payloads fail with `ScanError::Decode`.
    /// Dimensions are checked from the header before any pixel data is decoded.
    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedImage, ScanError> {
        if bytes.is_empty() {
            return Err(ScanError::Decode("empty image payload".to_string()));
        }

        if bytes.len() > self.config.max_image_bytes {
            return Err(ScanError::Decode(format!(
                "image payload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.config.max_image_bytes
            )));
        }

        let (width, height) = guessed_reader(bytes)?.into_dimensions()?;
        self.check_dimensions(width, height)?;

        let mut reader = guessed_reader(bytes)?;
        reader.limits(self.decode_limits());
        let decoded = reader.decode()?;
        tracing::debug!(
            target: "scan_pipeline",
            "Decoded {} byte payload into {}x{} image",
            bytes.len(),
            decoded.width(),
            decoded.height()
        );

        self.normalize_image(decoded.to_luma8())
    }

    /// Normalizes an already decoded grayscale image.
    pub fn normalize_image(&self, original: GrayImage) -> Result<NormalizedImage, ScanError> {
        if original.width() == 0 || original.height() == 0 {
            return Err(ScanError::Decode("image has no pixels".to_string()));
        }
        self.check_dimensions(original.width(), original.height())?;

        let enhanced = self.enhance(&original)?;

        let crop_region = self.locate(&original);
        let cropped = crop_region.map(|r| {
            imageops::crop_imm(&original, r.x, r.y, r.width, r.height).to_image()
        });

        let normalized = NormalizedImage {
            original,
            enhanced,
            cropped,
            crop_region,
        };

        if let Some(dir) = &self.config.debug_dir {
            write_debug_images(dir, &normalized);
        }

        Ok(normalized)
    }

    fn decode_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.config.max_image_dimension);
        limits.max_image_height = Some(self.config.max_image_dimension);
        limits
    }

    fn check_dimensions(&self, width: u32, height: u32) -> Result<(), ScanError> {
        let max_dim = self.config.max_image_dimension;
        if width > max_dim || height > max_dim {
            return Err(ScanError::Decode(format!(
                "image of {}x{} exceeds the {} pixel dimension limit",
                width, height, max_dim
            )));
        }

        let pixels = width as u64 * height as u64;
        if pixels > self.config.max_image_pixels {
            return Err(ScanError::Decode(format!(
                "image of {}x{} ({} pixels) exceeds the {} pixel limit",
                width, height, pixels, self.config.max_image_pixels
            )));
        }
        Ok(())
    }

    /// CLAHE with the configured clip limit and tile grid.
    pub fn enhance(&self, image: &GrayImage) -> Result<GrayImage, ScanError> {
        apply_clahe(image, self.config.clahe_clip_limit, self.config.clahe_grid)
            .map_err(|e| ScanError::Internal(e.to_string()))
    }

    /// Runs the localizer once and converts its box into an accepted crop region.
    fn locate(&self, image: &GrayImage) -> Option<Region> {
        let detected = match self.detector.detect_region(image) {
            Ok(region) => region?,
            Err(e) => {
                error_logging::log_collaborator_error(&e, "region_detector", "locate_barcode");
                return None;
            }
        };

        let padded = self.padded_crop_region(detected, image.width(), image.height());
        if padded.is_none() {
            tracing::debug!(
                target: "scan_pipeline",
                "Discarded localized region {:?} in {}x{} frame",
                detected,
                image.width(),
                image.height()
            );
        }
        padded
    }

    /// Pads a detected box and clamps it to the frame.
    ///
    /// Every side grows by `crop_padding_ratio` of the box size and the right
    /// side grows by another `right_extra_padding_ratio` of its width. Returns
    /// `None` when nothing of the box lies inside the frame or the padded box
    /// covers more than `max_crop_area_ratio` of it.
    pub fn padded_crop_region(
        &self,
        region: Region,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Region> {
        let pad_x = (region.width as f32 * self.config.crop_padding_ratio).round() as u32;
        let pad_y = (region.height as f32 * self.config.crop_padding_ratio).round() as u32;
        let extra_right =
            (region.width as f32 * self.config.right_extra_padding_ratio).round() as u32;

        let x0 = region.x.saturating_sub(pad_x);
        let y0 = region.y.saturating_sub(pad_y);
        let x1 = region
            .x
            .saturating_add(region.width)
            .saturating_add(pad_x)
            .saturating_add(extra_right)
            .min(frame_width);
        let y1 = region
            .y
            .saturating_add(region.height)
            .saturating_add(pad_y)
            .min(frame_height);

        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        let padded = Region::new(x0, y0, x1 - x0, y1 - y0);
        let frame_area = frame_width as f64 * frame_height as f64;
        if padded.area() as f64 > frame_area * self.config.max_crop_area_ratio as f64 {
            return None;
        }

        Some(padded)
    }
}

/// Persists the intermediate images. Failures are logged and otherwise ignored.
fn guessed_reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ScanError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ScanError::Decode(e.to_string()))
}

fn write_debug_images(dir: &Path, normalized: &NormalizedImage) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        error_logging::log_collaborator_error(&e, "debug_sink", "create_debug_dir");
        return;
    }

    let mut outputs = vec![
        ("01_original.png", &normalized.original),
        ("02_enhanced.png", &normalized.enhanced),
    ];
    if let Some(cropped) = &normalized.cropped {
        outputs.push(("03_cropped.png", cropped));
    }

    for (name, image) in outputs {
        let path = dir.join(name);
        match image.save(&path) {
            Ok(()) => tracing::debug!(
                target: "scan_pipeline",
                "Saved debug image {}",
                path.display()
            ),
            Err(e) => error_logging::log_collaborator_error(&e, "debug_sink", name),
        }
    }
}
