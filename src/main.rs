use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use upc_scanner::config::AppConfig;
use upc_scanner::errors::error_logging::log_config_error;
use upc_scanner::observability;
use upc_scanner::scanner::Scanner;
use upc_scanner::server;

/// Load and validate configuration at startup
fn load_configuration() -> Result<AppConfig> {
    let config = AppConfig::from_env()?;

    config.validate().map_err(|e| {
        anyhow::anyhow!(
            "Configuration validation failed: {}. Please check your environment variables.",
            e
        )
    })?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = match load_configuration() {
        Ok(config) => config,
        Err(e) => {
            // Tracing is not up yet; make sure the failure is visible
            eprintln!("{}", e);
            log_config_error(&e, "environment", "startup");
            return Err(e);
        }
    };

    // Initialize logging and the metrics endpoint
    observability::init_observability(
        &config.observability,
        &config.server.host,
        config.server.metrics_port,
    )
    .await?;

    info!(config = %config.summary(), "Configuration loaded");

    let scanner = Arc::new(Scanner::with_default_collaborators(
        config.normalizer.clone(),
        config.quality_gate.clone(),
        config.scan.clone(),
    ));

    info!(tiers = ?scanner.tier_names(), "Scanner initialized");

    server::serve(&config.server, scanner).await
}
