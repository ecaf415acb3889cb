//! # Unified Application Configuration
//!
//! This module consolidates all service settings into a single configuration
//! object. It supports loading from environment variables and validation.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::scan_config::{NormalizerConfig, QualityGateConfig, ScanConfig};

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port of the scan API
    pub port: u16,
    /// Port of the Prometheus metrics endpoint
    pub metrics_port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            metrics_port: 9090,
            max_upload_bytes: crate::scan_config::MAX_IMAGE_BYTES,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("Server host cannot be empty".to_string()));
        }

        if self.port == 0 || self.metrics_port == 0 {
            return Err(AppError::Config("Ports cannot be 0".to_string()));
        }

        if self.port == self.metrics_port {
            return Err(AppError::Config(
                "API port and metrics port cannot be the same".to_string(),
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "Max upload size cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Socket address string for the API listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Image normalization configuration
    pub normalizer: NormalizerConfig,
    /// Quality gate thresholds
    pub quality_gate: QualityGateConfig,
    /// Tier parameters
    pub scan: ScanConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

/// Read an environment variable, falling back to `default` when unset.
fn env_or<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Server
        config.server.host = env::var("SCANNER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        config.server.port = env_or("SCANNER_PORT", config.server.port)?;
        config.server.metrics_port = env_or("METRICS_PORT", config.server.metrics_port)?;
        config.server.max_upload_bytes =
            env_or("MAX_UPLOAD_BYTES", config.server.max_upload_bytes)?;

        // Normalizer
        config.normalizer.max_image_bytes = config.server.max_upload_bytes;
        config.normalizer.debug_dir = env::var("SCANNER_DEBUG_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        config.normalizer.max_image_pixels =
            env_or("MAX_IMAGE_PIXELS", config.normalizer.max_image_pixels)?;
        config.normalizer.max_crop_area_ratio =
            env_or("MAX_CROP_AREA_RATIO", config.normalizer.max_crop_area_ratio)?;
        config.normalizer.right_extra_padding_ratio = env_or(
            "RIGHT_EXTRA_PADDING_RATIO",
            config.normalizer.right_extra_padding_ratio,
        )?;

        // Quality gate
        config.quality_gate.min_blur_score =
            env_or("QUALITY_MIN_BLUR_SCORE", config.quality_gate.min_blur_score)?;
        config.quality_gate.min_contrast =
            env_or("QUALITY_MIN_CONTRAST", config.quality_gate.min_contrast)?;
        config.quality_gate.min_edge_density =
            env_or("QUALITY_MIN_EDGE_DENSITY", config.quality_gate.min_edge_density)?;

        // Observability
        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.server.validate()?;
        self.normalizer.validate()?;
        self.quality_gate.validate()?;
        self.scan.validate()?;
        self.observability.validate().map_err(AppError::Config)?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: bind={}, metrics_port={}, max_upload_bytes={}, debug_images={}, environment={}",
            self.server.bind_address(),
            self.server.metrics_port,
            self.server.max_upload_bytes,
            self.normalizer.debug_dir.is_some(),
            self.observability.environment
        )
    }
}
