//! # Tiered Scan Orchestrator
//!
//! A scan walks an ordered list of tiers, cheapest first. Each tier produces
//! candidate images from the normalized input and hands them to the decode
//! adapter. Every attempt is merged into a single accumulator; the scan stops
//! as soon as both the main symbol and the extension are known, or when the
//! tiers run out.
//!
//! Tier order:
//! 1. original at four quarter turns
//! 2. enhanced at four quarter turns
//! 3. original binarized at fixed levels, each at four quarter turns
//! 4. the localized crop and its CLAHE version at four quarter turns
//! 5. quality gate: unscannable images with nothing found stop here
//! 6. small-angle corrections of the original
//! 7. deep processing: upscale + threshold cascade, then skew correction

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::GrayImage;
use serde::Serialize;
use tracing;

use crate::decoding::{DecodeAdapter, RxingDecoder, ScanResult, SymbolDecoder};
use crate::errors::ScanError;
use crate::normalizer::{ImageNormalizer, NormalizedImage};
use crate::observability;
use crate::preprocessing::{
    apply_clahe, blur, estimate_skew_angle, fits_upscale_budget, invert, rotate90,
    rotate_arbitrary, threshold,
    upscale, BlurKind, BorderMode, Interpolation, PreprocessingError, QualityGate,
    QualityMetrics, Rotation, ThresholdMode,
};
use crate::region::{GradientRegionDetector, RegionDetector};
use crate::scan_config::{NormalizerConfig, QualityGateConfig, ScanConfig};

/// Terminal state of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanOutcome {
    /// Main symbol and extension found
    Complete,
    /// Main symbol found, extension missing
    Partial,
    /// Nothing usable found
    Empty,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Complete => "complete",
            ScanOutcome::Partial => "partial",
            ScanOutcome::Empty => "empty",
        }
    }

    fn from_result(result: &ScanResult) -> Self {
        if result.is_complete() {
            ScanOutcome::Complete
        } else if result.has_main() {
            ScanOutcome::Partial
        } else {
            ScanOutcome::Empty
        }
    }
}

/// Result of a scan plus run diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub result: ScanResult,
    pub outcome: ScanOutcome,
    pub quality: QualityMetrics,
    /// Number of decode attempts made
    pub attempts: usize,
    /// Tiers that ran, in order
    pub tiers_run: Vec<&'static str>,
    /// The quality gate ended the scan before the expensive tiers
    pub stopped_by_gate: bool,
    /// Tier during which the result became complete
    pub completed_by: Option<&'static str>,
    pub duration: Duration,
}

impl ScanReport {
    /// Converts the report into the caller-facing result.
    ///
    /// An extension without a main symbol is not a usable product code, so
    /// anything short of a main symbol is `ScanError::NotFound`.
    pub fn into_result(self) -> Result<ScanResult, ScanError> {
        if self.result.has_main() {
            Ok(self.result)
        } else {
            Err(ScanError::NotFound)
        }
    }
}

/// Whether the orchestrator should continue with the next tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierFlow {
    Continue,
    Stop,
}

/// Shared state of a single scan run.
pub struct ScanContext<'a> {
    pub image: &'a NormalizedImage,
    pub quality: &'a QualityMetrics,
    pub config: &'a ScanConfig,
    adapter: &'a DecodeAdapter,
    best: ScanResult,
    attempts: usize,
    tier: &'static str,
}

impl<'a> ScanContext<'a> {
    pub fn new(
        image: &'a NormalizedImage,
        quality: &'a QualityMetrics,
        config: &'a ScanConfig,
        adapter: &'a DecodeAdapter,
    ) -> Self {
        Self {
            image,
            quality,
            config,
            adapter,
            best: ScanResult::default(),
            attempts: 0,
            tier: "",
        }
    }

    /// Decodes one candidate and merges it into the accumulator.
    ///
    /// Returns what this candidate alone produced. Once the accumulator is
    /// complete no further decoding happens.
    pub fn attempt(&mut self, candidate: &GrayImage, label: &str) -> Result<ScanResult, ScanError> {
        if self.best.is_complete() {
            return Ok(ScanResult::default());
        }

        self.attempts += 1;
        let found = self.adapter.decode(candidate)?;

        tracing::debug!(
            target: "scan_pipeline",
            tier = self.tier,
            candidate = label,
            attempt = self.attempts,
            width = candidate.width(),
            height = candidate.height(),
            main = found.has_main(),
            extension = found.has_extension(),
            "Decode attempt"
        );

        self.best = std::mem::take(&mut self.best).merge(found.clone());
        Ok(found)
    }

    /// Tries `image` at each rotation, stopping once the accumulator is complete.
    pub fn attempt_rotations(
        &mut self,
        image: &GrayImage,
        rotations: &[Rotation],
        label: &str,
    ) -> Result<(), ScanError> {
        for &rotation in rotations {
            if self.is_complete() {
                break;
            }
            let candidate = rotate90(image, rotation);
            self.attempt(&candidate, &format!("{}@{}", label, rotation))?;
        }
        Ok(())
    }

    pub fn best(&self) -> &ScanResult {
        &self.best
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn is_complete(&self) -> bool {
        self.best.is_complete()
    }

    fn into_result(self) -> (ScanResult, usize) {
        (self.best, self.attempts)
    }
}

/// One cost-ranked stage of the scan.
pub trait ScanTier: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &mut ScanContext<'_>) -> Result<TierFlow, ScanError>;
}

fn transform_error(err: PreprocessingError) -> ScanError {
    ScanError::Internal(err.to_string())
}

/// Tier 1: the grayscale original at every configured rotation.
pub struct OriginalTier;

impl ScanTier for OriginalTier {
    fn name(&self) -> &'static str {
        "original"
    }

    fn run(&self, ctx: &mut ScanContext<'_>) -> Result<TierFlow, ScanError> {
        let image = ctx.image;
        let config = ctx.config;
        ctx.attempt_rotations(&image.original, &config.rotations, "original")?;
        Ok(TierFlow::Continue)
    }
}

/// Tier 2: the CLAHE-enhanced original at every configured rotation.
pub struct EnhancedTier;

impl ScanTier for EnhancedTier {
    fn name(&self) -> &'static str {
        "enhanced"
    }

    fn run(&self, ctx: &mut ScanContext<'_>) -> Result<TierFlow, ScanError> {
        let image = ctx.image;
        let config = ctx.config;
        ctx.attempt_rotations(&image.enhanced, &config.rotations, "enhanced")?;
        Ok(TierFlow::Continue)
    }
}

/// Tier 3: the original binarized at each fixed level, at every rotation.
pub struct FixedThresholdTier;

impl ScanTier for FixedThresholdTier {
    fn name(&self) -> &'static str {
        "fixed_thresholds"
    }

    fn run(&self, ctx: &mut ScanContext<'_>) -> Result<TierFlow, ScanError> {
        let image = ctx.image;
        let config = ctx.config;
        for &level in &config.fixed_thresholds {
            if ctx.is_complete() {
                break;
            }
            let binary = threshold(&image.original, ThresholdMode::Fixed(level));
            ctx.attempt_rotations(&binary, &config.rotations, &format!("threshold_{}", level))?;
        }
        Ok(TierFlow::Continue)
    }
}

/// Tier 4: the localized crop, then its CLAHE version, at every rotation.
pub struct CropTier {
    pub clahe_clip_limit: f32,
    pub clahe_grid: (u32, u32),
}

impl ScanTier for CropTier {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn run(&self, ctx: &mut ScanContext<'_>) -> Result<TierFlow, ScanError> {
        let image = ctx.image;
        let Some(cropped) = image.cropped.as_ref() else {
            return Ok(TierFlow::Continue);
        };

        let config = ctx.config;
        let rotations = &config.rotations;
        ctx.attempt_rotations(cropped, rotations, "crop")?;

        if !ctx.is_complete() {
            let enhanced = apply_clahe(cropped, self.clahe_clip_limit, self.clahe_grid)
                .map_err(transform_error)?;
            ctx.attempt_rotations(&enhanced, rotations, "crop_clahe")?;
        }
        Ok(TierFlow::Continue)
    }
}

/// Tier 5: stops unscannable images before the expensive tiers.
///
/// Never stops once anything (main or extension) has been found.
pub struct QualityGateTier;

impl ScanTier for QualityGateTier {
    fn name(&self) -> &'static str {
        "quality_gate"
    }

    fn run(&self, ctx: &mut ScanContext<'_>) -> Result<TierFlow, ScanError> {
        if ctx.best().is_empty() && !ctx.quality.scannable {
            tracing::debug!(
                target: "scan_pipeline",
                blur_score = ctx.quality.blur_score,
                contrast = ctx.quality.contrast,
                edge_density = ctx.quality.edge_density,
                "Quality gate stopped the scan"
            );
            return Ok(TierFlow::Stop);
        }
        Ok(TierFlow::Continue)
    }
}

/// Tier 6: small-angle rotations of the original with a constant fill.
pub struct SmallAngleTier;

impl ScanTier for SmallAngleTier {
    fn name(&self) -> &'static str {
        "small_angles"
    }

    fn run(&self, ctx: &mut ScanContext<'_>) -> Result<TierFlow, ScanError> {
        let image = ctx.image;
        let config = ctx.config;
        for &angle in &config.small_angles {
            if ctx.is_complete() {
                break;
            }
            let candidate = rotate_arbitrary(
                &image.original,
                angle,
                BorderMode::Constant(config.small_angle_fill),
            );
            ctx.attempt(&candidate, &format!("angle_{}", angle))?;
        }
        Ok(TierFlow::Continue)
    }
}

/// Tier 7: upscaling, a threshold cascade, and skew correction.
pub struct DeepProcessingTier;

impl DeepProcessingTier {
    /// Upscales only images narrower than the configured width limit whose
    /// upscaled size stays within the pixel budget.
    fn conditional_upscale(
        image: &GrayImage,
        config: &ScanConfig,
        interpolation: Interpolation,
    ) -> Result<GrayImage, ScanError> {
        let (width, height) = image.dimensions();
        if width >= config.upscale_below_width {
            return Ok(image.clone());
        }
        if !fits_upscale_budget(width, height, config.upscale_factor) {
            tracing::debug!(
                target: "scan_pipeline",
                width,
                height,
                "Skipping upscale, output would exceed the pixel budget"
            );
            return Ok(image.clone());
        }
        upscale(image, config.upscale_factor, interpolation).map_err(transform_error)
    }

    /// Fixed levels, Otsu, inverted Otsu, then horizontal blur + Otsu.
    ///
    /// Stops at the first candidate that itself yields a main symbol.
    fn threshold_cascade(
        ctx: &mut ScanContext<'_>,
        base: &GrayImage,
        label: &str,
    ) -> Result<(), ScanError> {
        let config = ctx.config;

        for &level in &config.deep_thresholds {
            if ctx.is_complete() {
                return Ok(());
            }
            let candidate = threshold(base, ThresholdMode::Fixed(level));
            if ctx
                .attempt(&candidate, &format!("{}_threshold_{}", label, level))?
                .has_main()
            {
                return Ok(());
            }
        }

        if ctx.is_complete() {
            return Ok(());
        }
        let otsu = threshold(base, ThresholdMode::Otsu);
        if ctx.attempt(&otsu, &format!("{}_otsu", label))?.has_main() {
            return Ok(());
        }

        if ctx.is_complete() {
            return Ok(());
        }
        if ctx
            .attempt(&invert(&otsu), &format!("{}_otsu_inverted", label))?
            .has_main()
        {
            return Ok(());
        }

        if ctx.is_complete() {
            return Ok(());
        }
        let smeared = threshold(&blur(base, BlurKind::Horizontal), ThresholdMode::Otsu);
        ctx.attempt(&smeared, &format!("{}_hblur_otsu", label))?;
        Ok(())
    }

    /// Straightens the bars when a skew is detected and tries once.
    fn deskew_attempt(
        ctx: &mut ScanContext<'_>,
        rotated: &GrayImage,
        label: &str,
    ) -> Result<(), ScanError> {
        let config = ctx.config;
        let upscaled = Self::conditional_upscale(rotated, config, Interpolation::Cubic)?;

        let Some(angle) = estimate_skew_angle(&upscaled, &config.skew) else {
            return Ok(());
        };

        let straightened = rotate_arbitrary(&upscaled, angle, BorderMode::Replicate);
        let cleaned = threshold(&blur(&straightened, BlurKind::Gaussian), ThresholdMode::Otsu);
        ctx.attempt(&cleaned, &format!("{}_deskew_{:.1}", label, angle))?;
        Ok(())
    }
}

impl ScanTier for DeepProcessingTier {
    fn name(&self) -> &'static str {
        "deep_processing"
    }

    fn run(&self, ctx: &mut ScanContext<'_>) -> Result<TierFlow, ScanError> {
        let image = ctx.image;
        let config = ctx.config;

        for &rotation in &config.deep_rotations {
            if ctx.is_complete() {
                break;
            }
            let rotated = rotate90(&image.original, rotation);
            let label = format!("deep@{}", rotation);

            let base = Self::conditional_upscale(&rotated, config, Interpolation::Linear)?;
            Self::threshold_cascade(ctx, &base, &label)?;

            if ctx.is_complete() {
                break;
            }
            Self::deskew_attempt(ctx, &rotated, &label)?;
        }
        Ok(TierFlow::Continue)
    }
}

/// The standard tier sequence.
pub fn default_tiers(normalizer: &NormalizerConfig) -> Vec<Box<dyn ScanTier>> {
    vec![
        Box::new(OriginalTier),
        Box::new(EnhancedTier),
        Box::new(FixedThresholdTier),
        Box::new(CropTier {
            clahe_clip_limit: normalizer.clahe_clip_limit,
            clahe_grid: normalizer.clahe_grid,
        }),
        Box::new(QualityGateTier),
        Box::new(SmallAngleTier),
        Box::new(DeepProcessingTier),
    ]
}

/// Barcode scanner: normalization, quality assessment, and the tier sequence.
///
/// A `Scanner` holds no per-scan state and can be shared across threads.
pub struct Scanner {
    normalizer: ImageNormalizer,
    gate: QualityGate,
    adapter: DecodeAdapter,
    config: ScanConfig,
    tiers: Vec<Box<dyn ScanTier>>,
}

impl Scanner {
    pub fn new(
        normalizer_config: NormalizerConfig,
        quality_config: QualityGateConfig,
        scan_config: ScanConfig,
        detector: Arc<dyn RegionDetector>,
        decoder: Arc<dyn SymbolDecoder>,
    ) -> Self {
        let tiers = default_tiers(&normalizer_config);
        Self {
            normalizer: ImageNormalizer::new(normalizer_config, detector),
            gate: QualityGate::new(quality_config),
            adapter: DecodeAdapter::new(decoder),
            config: scan_config,
            tiers,
        }
    }

    /// Scanner with the gradient localizer and the rxing decoder.
    pub fn with_default_collaborators(
        normalizer_config: NormalizerConfig,
        quality_config: QualityGateConfig,
        scan_config: ScanConfig,
    ) -> Self {
        Self::new(
            normalizer_config,
            quality_config,
            scan_config,
            Arc::new(GradientRegionDetector::default()),
            Arc::new(RxingDecoder::default()),
        )
    }

    /// Replaces the tier sequence.
    pub fn with_tiers(mut self, tiers: Vec<Box<dyn ScanTier>>) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Scans raw image bytes and returns the caller-facing result.
    pub fn scan(&self, bytes: &[u8]) -> Result<ScanResult, ScanError> {
        self.scan_bytes(bytes)?.into_result()
    }

    /// Scans raw image bytes and returns the full report.
    pub fn scan_bytes(&self, bytes: &[u8]) -> Result<ScanReport, ScanError> {
        let normalized = self.normalizer.normalize(bytes)?;
        self.scan_normalized(&normalized)
    }

    /// Scans an already decoded grayscale image.
    pub fn scan_image(&self, image: GrayImage) -> Result<ScanReport, ScanError> {
        let normalized = self.normalizer.normalize_image(image)?;
        self.scan_normalized(&normalized)
    }

    /// Runs the tier sequence over a normalized image.
    pub fn scan_normalized(&self, image: &NormalizedImage) -> Result<ScanReport, ScanError> {
        let start_time = Instant::now();
        let quality = self.gate.assess(&image.original);

        let mut ctx = ScanContext::new(image, &quality, &self.config, &self.adapter);
        let mut tiers_run = Vec::with_capacity(self.tiers.len());
        let mut stopped_by_gate = false;
        let mut completed_by = None;

        for tier in &self.tiers {
            if ctx.is_complete() {
                break;
            }

            ctx.tier = tier.name();
            tiers_run.push(tier.name());
            let flow = tier.run(&mut ctx)?;

            if ctx.is_complete() {
                completed_by = Some(tier.name());
                break;
            }
            if flow == TierFlow::Stop {
                stopped_by_gate = true;
                break;
            }
        }

        let (result, attempts) = ctx.into_result();
        let report = ScanReport {
            outcome: ScanOutcome::from_result(&result),
            result,
            quality,
            attempts,
            tiers_run,
            stopped_by_gate,
            completed_by,
            duration: start_time.elapsed(),
        };

        tracing::info!(
            target: "scan_pipeline",
            outcome = report.outcome.as_str(),
            attempts = report.attempts,
            tiers_run = report.tiers_run.len(),
            stopped_by_gate = report.stopped_by_gate,
            completed_by = ?report.completed_by,
            duration_ms = report.duration.as_millis() as u64,
            "Scan finished"
        );

        observability::record_scan_metrics(&report);

        Ok(report)
    }
}
