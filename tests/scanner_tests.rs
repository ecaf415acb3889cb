//! # Scanner Integration Tests
//!
//! End-to-end scans through the public API with synthetic images and
//! scripted decoders standing in for a real barcode reader.

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use upc_scanner::decoding::{Symbol, SymbolDecoder, Symbology};
    use upc_scanner::errors::ScanError;
    use upc_scanner::normalizer::ImageNormalizer;
    use upc_scanner::preprocessing::estimate_skew_angle;
    use upc_scanner::region::{NoRegionDetector, Region, RegionDetector};
    use upc_scanner::scan_config::{NormalizerConfig, QualityGateConfig, ScanConfig, SkewConfig};
    use upc_scanner::scanner::{ScanOutcome, Scanner};

    const L_CODES: [&str; 10] = [
        "0001101", "0011001", "0010011", "0111101", "0100011", "0110001", "0101111", "0111011",
        "0110111", "0001011",
    ];

    fn r_code(digit: usize) -> String {
        L_CODES[digit]
            .chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect()
    }

    fn g_code(digit: usize) -> String {
        r_code(digit).chars().rev().collect()
    }

    fn digits(text: &str) -> Vec<usize> {
        text.bytes().map(|b| (b - b'0') as usize).collect()
    }

    /// Module string of a UPC-A symbol followed by an EAN-5 add-on.
    fn upc_with_extension_modules(upc: &str, extension: &str) -> String {
        let upc = digits(upc);
        let mut modules = String::from("101");
        for &d in &upc[..6] {
            modules.push_str(L_CODES[d]);
        }
        modules.push_str("01010");
        for &d in &upc[6..] {
            modules.push_str(&r_code(d));
        }
        modules.push_str("101");

        // Gap between the main symbol and the add-on
        modules.push_str("000000000");

        let ext = digits(extension);
        let checksum = (3 * (ext[0] + ext[2] + ext[4]) + 9 * (ext[1] + ext[3])) % 10;
        // Bit set = G code for that digit, first digit in the highest bit
        const PARITY: [u8; 10] = [0x18, 0x14, 0x12, 0x11, 0x0C, 0x06, 0x03, 0x0A, 0x09, 0x05];
        modules.push_str("1011");
        for (i, &d) in ext.iter().enumerate() {
            if i > 0 {
                modules.push_str("01");
            }
            if PARITY[checksum] & (1 << (4 - i)) != 0 {
                modules.push_str(&g_code(d));
            } else {
                modules.push_str(L_CODES[d]);
            }
        }
        modules
    }

    /// Renders modules at 3px each with a 12-module quiet zone.
    fn render_symbol(modules: &str, height: u32) -> GrayImage {
        const MODULE_PX: u32 = 3;
        const QUIET: u32 = 12;
        let width = (modules.len() as u32 + 2 * QUIET) * MODULE_PX;
        let bars: Vec<bool> = modules.chars().map(|c| c == '1').collect();

        GrayImage::from_fn(width, height, |x, y| {
            let module = (x / MODULE_PX) as i64 - QUIET as i64;
            let in_rows = y >= 10 && y < height - 10;
            let dark = in_rows
                && module >= 0
                && (module as usize) < bars.len()
                && bars[module as usize];
            if dark {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    const UPC: &str = "036000291452";
    const EXTENSION: &str = "52495";

    /// Reads a "barcode" only when a dark marker sits in the bottom-right corner
    /// of the candidate and the top-left corner is light.
    struct CornerMarkerDecoder {
        calls: AtomicUsize,
        hits: Mutex<Vec<bool>>,
    }

    impl CornerMarkerDecoder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                hits: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hits(&self) -> Vec<bool> {
            self.hits.lock().unwrap().clone()
        }
    }

    fn corner_mean(image: &GrayImage, right: bool, bottom: bool) -> f64 {
        let (w, h) = image.dimensions();
        let cw = (w / 7).max(1);
        let ch = (h / 6).max(1);
        let x0 = if right { w - cw } else { 0 };
        let y0 = if bottom { h - ch } else { 0 };

        let mut sum = 0u64;
        for y in y0..y0 + ch {
            for x in x0..x0 + cw {
                sum += image.get_pixel(x, y)[0] as u64;
            }
        }
        sum as f64 / (cw as u64 * ch as u64) as f64
    }

    impl SymbolDecoder for CornerMarkerDecoder {
        fn decode_symbols(
            &self,
            image: &GrayImage,
            _allowed: &[Symbology],
        ) -> anyhow::Result<Vec<Symbol>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let hit = image.width() > 0
                && image.height() > 0
                && corner_mean(image, true, true) < 80.0
                && corner_mean(image, false, false) > 150.0;
            self.hits.lock().unwrap().push(hit);

            if hit {
                Ok(vec![Symbol::new(Symbology::UpcA, UPC)])
            } else {
                Ok(vec![])
            }
        }
    }

    /// Counts calls and never finds anything.
    #[derive(Default)]
    struct CountingDecoder {
        calls: AtomicUsize,
    }

    impl SymbolDecoder for CountingDecoder {
        fn decode_symbols(
            &self,
            _image: &GrayImage,
            _allowed: &[Symbology],
        ) -> anyhow::Result<Vec<Symbol>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    /// Finds both symbols, but only in candidates of one exact size.
    struct SizedDecoder {
        width: u32,
        height: u32,
    }

    impl SymbolDecoder for SizedDecoder {
        fn decode_symbols(
            &self,
            image: &GrayImage,
            _allowed: &[Symbology],
        ) -> anyhow::Result<Vec<Symbol>> {
            if image.dimensions() == (self.width, self.height) {
                Ok(vec![
                    Symbol::new(Symbology::UpcA, UPC),
                    Symbol::new(Symbology::Ean5, EXTENSION),
                ])
            } else {
                Ok(vec![])
            }
        }
    }

    struct FixedRegion(Region);

    impl RegionDetector for FixedRegion {
        fn detect_region(&self, _image: &GrayImage) -> anyhow::Result<Option<Region>> {
            Ok(Some(self.0))
        }
    }

    fn scanner_with(
        detector: Arc<dyn RegionDetector>,
        decoder: Arc<dyn SymbolDecoder>,
    ) -> Scanner {
        Scanner::new(
            NormalizerConfig::default(),
            QualityGateConfig::default(),
            ScanConfig::default(),
            detector,
            decoder,
        )
    }

    /// Light frame with a dark block in the top-left corner.
    fn marker_image() -> GrayImage {
        let mut img = GrayImage::from_pixel(140, 96, Luma([230]));
        for y in 0..24 {
            for x in 0..30 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        img
    }

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img.clone())
            .write_to(&mut buf, image::ImageFormat::Png)
            .expect("PNG encoding should succeed");
        buf.into_inner()
    }

    fn vertical_bars(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            if (x / 6) % 2 == 0 {
                Luma([20])
            } else {
                Luma([235])
            }
        })
    }

    /// Test that an upside-down symbol is found by the 180° attempt of the first tier
    #[test]
    fn test_upside_down_symbol_found_by_rotation() {
        let decoder = Arc::new(CornerMarkerDecoder::new());
        let scanner = scanner_with(Arc::new(NoRegionDetector), decoder.clone());

        let report = scanner
            .scan_bytes(&png_bytes(&marker_image()))
            .expect("scan should run");

        let hits = decoder.hits();
        assert!(hits.len() >= 3);
        assert!(!hits[0], "direct decode must fail");
        assert!(!hits[1], "90° decode must fail");
        assert!(hits[2], "180° decode must succeed");

        assert_eq!(report.outcome, ScanOutcome::Partial);
        let result = report.into_result().expect("main symbol was found");
        assert_eq!(result.main.as_deref(), Some(UPC));
        assert_eq!(result.extension, None);
    }

    /// Test that scanning identical bytes twice gives identical results
    #[test]
    fn test_scan_is_idempotent() {
        let bytes = png_bytes(&marker_image());

        let first_decoder = Arc::new(CornerMarkerDecoder::new());
        let first = scanner_with(Arc::new(NoRegionDetector), first_decoder.clone())
            .scan_bytes(&bytes)
            .expect("first scan should run");

        let second_decoder = Arc::new(CornerMarkerDecoder::new());
        let second = scanner_with(Arc::new(NoRegionDetector), second_decoder.clone())
            .scan_bytes(&bytes)
            .expect("second scan should run");

        assert_eq!(first.result, second.result);
        assert_eq!(first.attempts, second.attempts);
        assert_eq!(first.tiers_run, second.tiers_run);
        assert_eq!(first_decoder.hits(), second_decoder.hits());
        assert_eq!(first_decoder.calls(), second_decoder.calls());
    }

    /// Test that a shared scanner gives the same answer on repeated calls
    #[test]
    fn test_shared_scanner_repeated_scans() {
        let scanner = scanner_with(
            Arc::new(NoRegionDetector),
            Arc::new(CornerMarkerDecoder::new()),
        );
        let bytes = png_bytes(&marker_image());

        let first = scanner.scan(&bytes).expect("symbol should be found");
        let second = scanner.scan(&bytes).expect("symbol should be found");
        assert_eq!(first, second);
    }

    /// Test that a featureless image never reaches the expensive tiers
    #[test]
    fn test_quality_gate_short_circuits_uniform_image() {
        let decoder = Arc::new(CountingDecoder::default());
        let scanner = scanner_with(Arc::new(NoRegionDetector), decoder.clone());

        let report = scanner
            .scan_image(GrayImage::from_pixel(120, 80, Luma([128])))
            .expect("scan should run");

        assert!(report.stopped_by_gate);
        assert!(!report.quality.scannable);
        assert_eq!(report.outcome, ScanOutcome::Empty);
        assert!(!report.tiers_run.contains(&"small_angles"));
        assert!(!report.tiers_run.contains(&"deep_processing"));
        assert_eq!(report.attempts, decoder.calls.load(Ordering::SeqCst));
        assert_eq!(report.into_result(), Err(ScanError::NotFound));
    }

    /// Test that a localized crop is scanned and can complete the result
    #[test]
    fn test_crop_tier_completes_scan() {
        // Region (100,100,100,50) in a 400x300 frame pads to 160x66
        let scanner = scanner_with(
            Arc::new(FixedRegion(Region::new(100, 100, 100, 50))),
            Arc::new(SizedDecoder {
                width: 160,
                height: 66,
            }),
        );

        let report = scanner
            .scan_image(vertical_bars(400, 300))
            .expect("scan should run");

        assert_eq!(report.outcome, ScanOutcome::Complete);
        assert_eq!(report.completed_by, Some("crop"));
        assert_eq!(report.result.main.as_deref(), Some(UPC));
        assert_eq!(report.result.extension.as_deref(), Some(EXTENSION));
    }

    /// Test that a localization covering most of the frame is not cropped
    #[test]
    fn test_oversized_region_is_rejected() {
        let normalizer = ImageNormalizer::new(
            NormalizerConfig::default(),
            Arc::new(FixedRegion(Region::new(10, 10, 380, 280))),
        );

        let normalized = normalizer
            .normalize(&png_bytes(&vertical_bars(400, 300)))
            .expect("normalization should succeed");

        assert!(normalized.cropped.is_none());
        assert!(normalized.crop_region.is_none());
        assert_eq!(normalized.original.dimensions(), (400, 300));
        assert_eq!(normalized.enhanced.dimensions(), (400, 300));
    }

    /// Test that undecodable bytes are a client error
    #[test]
    fn test_garbage_bytes_are_decode_error() {
        let scanner = scanner_with(
            Arc::new(NoRegionDetector),
            Arc::new(CountingDecoder::default()),
        );

        let err = scanner
            .scan(b"definitely not an image")
            .expect_err("garbage must not decode");
        assert!(matches!(err, ScanError::Decode(_)));
        assert_eq!(err.status_code(), 400);
    }

    /// Test that a printed UPC-A with its add-on completes on the first attempt
    #[test]
    fn test_default_collaborators_read_symbol_and_extension() {
        let scanner = Scanner::with_default_collaborators(
            NormalizerConfig::default(),
            QualityGateConfig::default(),
            ScanConfig::default(),
        );
        let img = render_symbol(&upc_with_extension_modules(UPC, EXTENSION), 120);

        let report = scanner
            .scan_bytes(&png_bytes(&img))
            .expect("scan should run");

        assert_eq!(report.outcome, ScanOutcome::Complete);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.completed_by, Some("original"));
        assert_eq!(report.result.main.as_deref(), Some(UPC));
        assert_eq!(report.result.extension.as_deref(), Some(EXTENSION));
    }

    /// Test that upright bars need no skew correction
    #[test]
    fn test_upright_bars_have_negligible_skew() {
        let bars = vertical_bars(300, 200);
        assert_eq!(estimate_skew_angle(&bars, &SkewConfig::default()), None);
    }
}
