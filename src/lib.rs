//! # UPC Scanner
//!
//! Reads UPC-A, UPC-E and EAN-13 product barcodes, plus an optional 5-digit
//! EAN-5 supplemental, from photographs. Scanning is a cost-ranked sequence of
//! preprocessing tiers that stops as soon as both symbols are found.

pub mod config;
pub mod decoding;
pub mod errors;
pub mod normalizer;
pub mod observability;
pub mod observability_config;
pub mod preprocessing;
pub mod region;
pub mod scan_config;
pub mod scanner;
pub mod server;

// Re-export types for easier access
pub use decoding::{ScanResult, Symbol, SymbolDecoder, Symbology};
pub use errors::ScanError;
pub use region::{Region, RegionDetector};
pub use scanner::{ScanOutcome, ScanReport, Scanner};
