//! # Application Error Types
//!
//! This module defines the error types used throughout the barcode scanner.
//! `ScanError` covers the per-request failure modes of a scan; `AppError` covers
//! configuration and startup problems.

use std::fmt;

/// Errors surfaced by a single scan request.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    /// The uploaded bytes are not a usable raster image (client input error)
    Decode(String),
    /// Every tier ran and neither a main symbol nor an extension was found
    NotFound,
    /// A collaborator failed unexpectedly during the scan (server fault)
    Internal(String),
}

impl ScanError {
    /// HTTP status code used when the error reaches the service boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            ScanError::Decode(_) | ScanError::NotFound => 400,
            ScanError::Internal(_) => 500,
        }
    }

    /// Whether the caller, not the service, is responsible for the failure.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Decode(_) => "decode",
            ScanError::NotFound => "not_found",
            ScanError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Decode(msg) => write!(f, "Could not decode image: {}", msg),
            ScanError::NotFound => write!(f, "No barcode found"),
            ScanError::Internal(msg) => write!(f, "Internal scanner error: {}", msg),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<image::ImageError> for ScanError {
    fn from(err: image::ImageError) -> Self {
        ScanError::Decode(err.to_string())
    }
}

/// General application error type for configuration and startup
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Input validation errors
    Validation(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Decode(msg) => AppError::Validation(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting
pub mod error_logging {
    use tracing::{error, warn};

    /// Log a failed scan request with image and timing context.
    ///
    /// Client-side failures are logged at WARN, server faults at ERROR.
    pub fn log_scan_error(
        error: &super::ScanError,
        operation: &str,
        image_size: Option<usize>,
        processing_duration: Option<std::time::Duration>,
    ) {
        if error.is_client_error() {
            warn!(
                error = %error,
                kind = error.kind(),
                operation = %operation,
                image_size_bytes = ?image_size,
                processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
                "Scan request rejected"
            );
        } else {
            error!(
                error = %error,
                kind = error.kind(),
                operation = %operation,
                image_size_bytes = ?image_size,
                processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
                "Scan request failed"
            );
        }
    }

    /// Log collaborator failures that were downgraded instead of propagated
    pub fn log_collaborator_error(
        error: &impl std::fmt::Display,
        collaborator: &str,
        operation: &str,
    ) {
        warn!(
            error = %error,
            collaborator = %collaborator,
            operation = %operation,
            "Collaborator failed, continuing without its result"
        );
    }

    /// Log network/communication errors with connection context
    pub fn log_network_error(
        error: &impl std::fmt::Display,
        operation: &str,
        endpoint: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            "Network operation failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}
