//! rxing-backed implementation of [`SymbolDecoder`].

use std::collections::HashSet;

use image::{DynamicImage, GrayImage};
use rxing::common::HybridBinarizer;
use rxing::{
    BarcodeFormat, BinaryBitmap, BufferedImageLuminanceSource, DecodeHintType, DecodeHintValue,
    DecodingHintDictionary, Exceptions, MultiUseMultiFormatReader, RXingResultMetadataType,
    RXingResultMetadataValue, Reader,
};
use tracing;

use super::{Symbol, SymbolDecoder, Symbology};

const EXTENSION_LENGTH: usize = 5;

/// Decodes UPC/EAN symbols with rxing.
///
/// rxing reports a supplemental extension as metadata of the main result, so a
/// found EAN-5 is surfaced as a separate `Ean5` symbol.
#[derive(Debug, Clone)]
pub struct RxingDecoder {
    /// Enables rxing's slower, more thorough row scanning
    pub try_harder: bool,
}

impl Default for RxingDecoder {
    fn default() -> Self {
        Self { try_harder: true }
    }
}

impl RxingDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn hints(&self, allowed: &[Symbology]) -> DecodingHintDictionary {
        let mut formats: HashSet<BarcodeFormat> =
            allowed.iter().filter_map(to_barcode_format).collect();

        // The extension is only reachable through a main symbol
        if formats.is_empty() && allowed.contains(&Symbology::Ean5) {
            formats = HashSet::from([
                BarcodeFormat::UPC_A,
                BarcodeFormat::UPC_E,
                BarcodeFormat::EAN_13,
            ]);
        }

        let mut hints = DecodingHintDictionary::new();
        hints.insert(
            DecodeHintType::POSSIBLE_FORMATS,
            DecodeHintValue::PossibleFormats(formats),
        );
        if self.try_harder {
            hints.insert(DecodeHintType::TRY_HARDER, DecodeHintValue::TryHarder(true));
        }
        hints
    }
}

impl SymbolDecoder for RxingDecoder {
    fn decode_symbols(
        &self,
        image: &GrayImage,
        allowed: &[Symbology],
    ) -> anyhow::Result<Vec<Symbol>> {
        if allowed.is_empty() || image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let hints = self.hints(allowed);
        let source = BufferedImageLuminanceSource::new(DynamicImage::ImageLuma8(image.clone()));
        let mut bitmap = BinaryBitmap::new(HybridBinarizer::new(source));
        let mut reader = MultiUseMultiFormatReader::default();

        let result = match reader.decode_with_hints(&mut bitmap, &hints) {
            Ok(result) => result,
            Err(Exceptions::NotFoundException(_))
            | Err(Exceptions::ChecksumException(_))
            | Err(Exceptions::FormatException(_)) => return Ok(Vec::new()),
            Err(e) => return Err(anyhow::anyhow!("rxing decode failed: {}", e)),
        };

        let mut symbols = Vec::with_capacity(2);
        let symbology = from_barcode_format(result.getBarcodeFormat());
        if allowed.contains(&symbology) {
            symbols.push(Symbol::new(symbology, result.getText()));
        }

        if allowed.contains(&Symbology::Ean5) {
            if let Some(RXingResultMetadataValue::UpcEanExtension(extension)) = result
                .getRXingResultMetadata()
                .get(&RXingResultMetadataType::UPC_EAN_EXTENSION)
            {
                if extension.len() == EXTENSION_LENGTH {
                    symbols.push(Symbol::new(Symbology::Ean5, extension.clone()));
                }
            }
        }

        tracing::trace!(
            target: "scan_pipeline",
            "rxing decoded {} symbol(s) from {}x{} image",
            symbols.len(),
            image.width(),
            image.height()
        );

        Ok(symbols)
    }
}

fn to_barcode_format(symbology: &Symbology) -> Option<BarcodeFormat> {
    match symbology {
        Symbology::UpcA => Some(BarcodeFormat::UPC_A),
        Symbology::UpcE => Some(BarcodeFormat::UPC_E),
        Symbology::Ean13 => Some(BarcodeFormat::EAN_13),
        Symbology::Ean5 | Symbology::Other(_) => None,
    }
}

fn from_barcode_format(format: &BarcodeFormat) -> Symbology {
    match format {
        BarcodeFormat::UPC_A => Symbology::UpcA,
        BarcodeFormat::UPC_E => Symbology::UpcE,
        BarcodeFormat::EAN_13 => Symbology::Ean13,
        other => Symbology::Other(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::UPC_EAN_SYMBOLOGIES;
    use image::Luma;

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

    #[test]
    fn test_blank_image_has_no_symbols() {
        let decoder = RxingDecoder::default();
        let img = GrayImage::from_pixel(200, 100, Luma([255]));
        let symbols = decoder
            .decode_symbols(&img, &UPC_EAN_SYMBOLOGIES)
            .expect("a blank image is not a decoder fault");
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_empty_allow_list_short_circuits() {
        let decoder = RxingDecoder::default();
        let img = GrayImage::from_pixel(20, 20, Luma([0]));
        let symbols = decoder
            .decode_symbols(&img, &[])
            .expect("empty allow-list should succeed");
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_decodes_upc_a_with_extension() {
        let img = render_symbol(&upc_with_extension_modules("036000291452", "52495"), 120);
        let symbols = RxingDecoder::default()
            .decode_symbols(&img, &UPC_EAN_SYMBOLOGIES)
            .expect("a clean symbol should decode");

        assert_eq!(
            symbols,
            vec![
                Symbol::new(Symbology::UpcA, "036000291452"),
                Symbol::new(Symbology::Ean5, "52495"),
            ]
        );
    }

    #[test]
    fn test_extension_dropped_when_not_requested() {
        let img = render_symbol(&upc_with_extension_modules("036000291452", "52495"), 120);
        let symbols = RxingDecoder::default()
            .decode_symbols(&img, &[Symbology::UpcA, Symbology::Ean13])
            .expect("a clean symbol should decode");

        assert_eq!(symbols, vec![Symbol::new(Symbology::UpcA, "036000291452")]);
    }

    #[test]
    fn test_format_mapping() {
        assert_eq!(
            to_barcode_format(&Symbology::UpcA),
            Some(BarcodeFormat::UPC_A)
        );
        assert_eq!(to_barcode_format(&Symbology::Ean5), None);
        assert_eq!(
            from_barcode_format(&BarcodeFormat::EAN_13),
            Symbology::Ean13
        );
        assert!(matches!(
            from_barcode_format(&BarcodeFormat::QR_CODE),
            Symbology::Other(_)
        ));
    }

    #[test]
    fn test_extension_only_allow_list_still_searches_main_formats() {
        let hints = RxingDecoder::default().hints(&[Symbology::Ean5]);
        match hints.get(&DecodeHintType::POSSIBLE_FORMATS) {
            Some(DecodeHintValue::PossibleFormats(formats)) => {
                assert!(formats.contains(&BarcodeFormat::EAN_13));
                assert_eq!(formats.len(), 3);
            }
            _ => panic!("POSSIBLE_FORMATS hint should be set"),
        }
    }
}
