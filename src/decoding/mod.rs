//! # Symbol Decoding
//!
//! The scanner never reads bit patterns itself. A [`SymbolDecoder`] turns a
//! grayscale image into zero or more [`Symbol`]s, and the [`DecodeAdapter`]
//! classifies those into the main product code and its 5-digit extension.

use std::sync::Arc;

use image::GrayImage;
use serde::Serialize;
use tracing;

use crate::errors::ScanError;

pub mod rxing_backend;

pub use rxing_backend::RxingDecoder;

/// Barcode symbologies the scanner distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbology {
    UpcA,
    UpcE,
    Ean13,
    /// 5-digit supplemental printed to the right of a main symbol
    Ean5,
    /// Any other symbology reported by a decoder
    Other(String),
}

impl Symbology {
    /// Whether this symbology carries the main product code.
    pub fn is_main(&self) -> bool {
        matches!(self, Symbology::UpcA | Symbology::UpcE | Symbology::Ean13)
    }
}

/// Allow-list used for every decode attempt.
pub const UPC_EAN_SYMBOLOGIES: [Symbology; 4] = [
    Symbology::UpcA,
    Symbology::UpcE,
    Symbology::Ean13,
    Symbology::Ean5,
];

/// A decoded symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub symbology: Symbology,
    pub payload: String,
}

impl Symbol {
    pub fn new(symbology: Symbology, payload: impl Into<String>) -> Self {
        Self {
            symbology,
            payload: payload.into(),
        }
    }
}

/// Barcode symbol decoding capability.
///
/// Implementations return `Ok(vec![])` when no symbol is present. Errors are
/// reserved for decoder faults.
pub trait SymbolDecoder: Send + Sync {
    fn decode_symbols(
        &self,
        image: &GrayImage,
        allowed: &[Symbology],
    ) -> anyhow::Result<Vec<Symbol>>;
}

/// Main product code and extension found so far.
///
/// Empty strings are treated as absent everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub main: Option<String>,
    pub extension: Option<String>,
}

impl ScanResult {
    pub fn new(main: Option<String>, extension: Option<String>) -> Self {
        Self {
            main: main.filter(|s| !s.is_empty()),
            extension: extension.filter(|s| !s.is_empty()),
        }
    }

    /// Combines two results; values already present in `self` are never replaced.
    ///
    /// ```
    /// use upc_scanner::decoding::ScanResult;
    ///
    /// let first = ScanResult::new(Some("036000291452".into()), None);
    /// let second = ScanResult::new(Some("999999999999".into()), Some("52495".into()));
    /// let merged = first.merge(second);
    /// assert_eq!(merged.main.as_deref(), Some("036000291452"));
    /// assert_eq!(merged.extension.as_deref(), Some("52495"));
    /// ```
    pub fn merge(self, other: ScanResult) -> ScanResult {
        ScanResult {
            main: non_empty(self.main).or_else(|| non_empty(other.main)),
            extension: non_empty(self.extension).or_else(|| non_empty(other.extension)),
        }
    }

    pub fn has_main(&self) -> bool {
        self.main.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_extension(&self) -> bool {
        self.extension.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Both the main symbol and the extension are known.
    pub fn is_complete(&self) -> bool {
        self.has_main() && self.has_extension()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_main() && !self.has_extension()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Runs the symbol decoder and classifies its output.
#[derive(Clone)]
pub struct DecodeAdapter {
    decoder: Arc<dyn SymbolDecoder>,
}

impl DecodeAdapter {
    pub fn new(decoder: Arc<dyn SymbolDecoder>) -> Self {
        Self { decoder }
    }

    /// Decodes one candidate image.
    ///
    /// The first main symbol wins; an EAN-5 symbol fills the extension; other
    /// symbologies are ignored. "Nothing found" is an empty result, never an error.
    pub fn decode(&self, image: &GrayImage) -> Result<ScanResult, ScanError> {
        let symbols = self
            .decoder
            .decode_symbols(image, &UPC_EAN_SYMBOLOGIES)
            .map_err(|e| ScanError::Internal(format!("symbol decoder failed: {}", e)))?;

        Ok(classify(symbols))
    }
}

/// Splits decoded symbols into main and extension.
pub fn classify(symbols: Vec<Symbol>) -> ScanResult {
    let mut main = None;
    let mut extension = None;

    for symbol in symbols {
        if symbol.payload.is_empty() {
            continue;
        }
        match symbol.symbology {
            ref s if s.is_main() => {
                if main.is_none() {
                    main = Some(symbol.payload);
                }
            }
            Symbology::Ean5 => {
                if extension.is_none() {
                    extension = Some(symbol.payload);
                }
            }
            ref other => {
                tracing::trace!(
                    target: "scan_pipeline",
                    "Ignoring {:?} symbol",
                    other
                );
            }
        }
    }

    ScanResult { main, extension }
}
