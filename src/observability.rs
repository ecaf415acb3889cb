//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Metrics collection and Prometheus export on a dedicated port
//! - Span and metric helpers used by the scanner and the HTTP layer

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use crate::errors::ScanError;
use crate::observability_config::{LogFormat, ObservabilityConfig};
use crate::scanner::ScanReport;

/// Initialize logging and, when enabled, the Prometheus recorder and its server.
///
/// Returns the metrics handle when metrics export is enabled.
pub async fn init_observability(
    config: &ObservabilityConfig,
    metrics_host: &str,
    metrics_port: u16,
) -> Result<Option<PrometheusHandle>> {
    // Validate configuration
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    // Initialize tracing first
    init_tracing(config)?;

    if !config.enable_metrics_export {
        tracing::info!(
            environment = %config.environment,
            "Observability initialized without metrics export"
        );
        return Ok(None);
    }

    let metrics_handle = init_metrics()?;
    start_metrics_server(metrics_handle.clone(), metrics_host, metrics_port).await?;

    tracing::info!(
        environment = %config.environment,
        metrics_port = %metrics_port,
        "Observability stack initialized successfully"
    );
    Ok(Some(metrics_handle))
}

/// Initialize structured logging with tracing and configuration
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("upc_scanner={}", config.log_level.to_lowercase()).parse()?)
        .add_directive("hyper=warn".parse()?);

    // Pretty for development, JSON everywhere else unless overridden
    match config.effective_log_format() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?,
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Install the Prometheus recorder
fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Metrics collection initialized");
    Ok(handle)
}

/// Serve `GET /metrics` in the background.
async fn start_metrics_server(metrics_handle: PrometheusHandle, host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    tracing::info!("Metrics server listening on {}", listener.local_addr()?);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let metrics_handle = metrics_handle.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                async move {
                                    match (req.method(), req.uri().path()) {
                                        (&hyper::Method::GET, "/metrics") => {
                                            let metrics = metrics_handle.render();
                                            Ok::<_, std::convert::Infallible>(hyper::Response::new(
                                                metrics,
                                            ))
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            tracing::error!("Error serving metrics connection: {:?}", err);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting metrics connection: {}", e);
                }
            }
        }
    });

    Ok(())
}

/// Create a span for a single scan request
pub fn scan_span(request_id: u64) -> tracing::Span {
    tracing::info_span!("scan_request", request_id = request_id, component = "scanner")
}

/// Record the outcome of a completed scan run
pub fn record_scan_metrics(report: &ScanReport) {
    metrics::counter!("scan_requests_total", "outcome" => report.outcome.as_str()).increment(1);
    metrics::histogram!("scan_decode_attempts").record(report.attempts as f64);
    metrics::histogram!("scan_duration_seconds").record(report.duration.as_secs_f64());
    if let Some(tier) = report.completed_by {
        metrics::counter!("scan_completed_tier_total", "tier" => tier).increment(1);
    }
    if report.stopped_by_gate {
        metrics::counter!("scan_quality_gate_stops_total").increment(1);
    }
}

/// Record a scan that ended in an error before producing a report
pub fn record_scan_failure(error: &ScanError) {
    metrics::counter!("scan_requests_total", "outcome" => error.kind()).increment(1);
}

/// Record request metrics
pub fn record_request_metrics(method: &str, status: u16, duration: std::time::Duration) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("http_requests_total", "method" => method, "status" => status).increment(1);
    metrics::histogram!("http_request_duration_seconds").record(duration.as_secs_f64());
}
