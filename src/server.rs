//! # HTTP Service
//!
//! Thin hyper front end over a shared [`Scanner`]. Every scan runs on the
//! blocking pool; the scanner itself is immutable and shared via `Arc`.
//!
//! Routes:
//! - `POST /scan`: a multipart form with an `image` file field, or the raw
//!   image bytes as the body; `{"upc", "extension"}` out
//! - `GET /`: service banner
//! - `GET /health`: liveness probe
//! - `OPTIONS *`: CORS preflight
//!
//! Every response carries permissive CORS headers.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use multer::Multipart;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::decoding::ScanResult;
use crate::errors::error_logging::{log_network_error, log_scan_error};
use crate::errors::ScanError;
use crate::observability::{record_request_metrics, record_scan_failure, scan_span};
use crate::scanner::Scanner;

/// Form field holding the uploaded image.
const IMAGE_FIELD: &str = "image";

/// State shared by every connection.
pub struct AppState {
    scanner: Arc<Scanner>,
    max_upload_bytes: usize,
    next_request_id: AtomicU64,
}

impl AppState {
    pub fn new(scanner: Arc<Scanner>, max_upload_bytes: usize) -> Self {
        Self {
            scanner,
            max_upload_bytes,
            next_request_id: AtomicU64::new(1),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Bind the API listener and serve until Ctrl-C.
pub async fn serve(config: &ServerConfig, scanner: Arc<Scanner>) -> Result<()> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Scan API listening on {}", listener.local_addr()?);

    let state = Arc::new(AppState::new(scanner, config.max_upload_bytes));

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = Arc::clone(&state);

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                            handle_request(req, Arc::clone(&state))
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            debug!(peer = %peer, "Error serving API connection: {:?}", err);
                        }
                    });
                }
                Err(e) => {
                    log_network_error(&e, "accept_connection", Some("/"));
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping scan API");
                return Ok(());
            }
        }
    }
}

/// Route one request and record request metrics.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start_time = Instant::now();
    let method = req.method().clone();

    if method == Method::OPTIONS {
        let response = preflight_response();
        record_request_metrics(method.as_str(), response.status().as_u16(), start_time.elapsed());
        return Ok(response);
    }

    let (status, body) = match (req.method(), req.uri().path()) {
        (&Method::POST, "/scan") => scan_route(req, &state).await,
        (&Method::GET, "/") => (
            StatusCode::OK,
            json!({ "status": "barcode service running" }),
        ),
        (&Method::GET, "/health") => (StatusCode::OK, json!({ "status": "ok" })),
        _ => (StatusCode::NOT_FOUND, json!({ "detail": "Not Found" })),
    };

    record_request_metrics(method.as_str(), status.as_u16(), start_time.elapsed());
    Ok(json_response(status, &body))
}

async fn scan_route<B>(req: Request<B>, state: &AppState) -> (StatusCode, Value)
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start_time = Instant::now();
    let request_id = state.next_request_id();

    let bytes = match read_body(req, state.max_upload_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => return error_body(&err, None, start_time.elapsed()),
    };
    let image_size = bytes.len();

    let scanner = Arc::clone(&state.scanner);
    let outcome = tokio::task::spawn_blocking(move || {
        let span = scan_span(request_id);
        let _guard = span.enter();
        scanner.scan(&bytes)
    })
    .await
    .unwrap_or_else(|e| Err(ScanError::Internal(format!("scan task failed: {}", e))));

    match outcome {
        Ok(result) => (StatusCode::OK, success_body(&result)),
        Err(err) => error_body(&err, Some(image_size), start_time.elapsed()),
    }
}

async fn read_body<B>(req: Request<B>, limit: usize) -> Result<Bytes, ScanError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large(limit));
    }

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let collected = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|_| too_large(limit))?
        .to_bytes();

    match content_type {
        Some(ct) if ct.to_ascii_lowercase().starts_with("multipart/form-data") => {
            image_from_multipart(&ct, collected).await
        }
        _ => Ok(collected),
    }
}

/// Pull the `image` field out of a multipart/form-data body.
async fn image_from_multipart(content_type: &str, body: Bytes) -> Result<Bytes, ScanError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| ScanError::Decode(format!("invalid multipart upload: {}", e)))?;
    let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = Multipart::new(stream, boundary);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ScanError::Decode(format!("invalid multipart upload: {}", e)))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| ScanError::Decode(format!("invalid multipart upload: {}", e)));
        }
    }

    Err(ScanError::Decode(format!(
        "multipart upload has no `{}` field",
        IMAGE_FIELD
    )))
}

fn too_large(limit: usize) -> ScanError {
    ScanError::Decode(format!("image exceeds the {} byte upload limit", limit))
}

fn success_body(result: &ScanResult) -> Value {
    json!({
        "upc": result.main,
        "extension": result.extension,
    })
}

fn error_body(err: &ScanError, image_size: Option<usize>, elapsed: Duration) -> (StatusCode, Value) {
    log_scan_error(err, "scan", image_size, Some(elapsed));
    // NotFound is already counted from the scan report
    if !matches!(err, ScanError::NotFound) {
        record_scan_failure(err);
    }

    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, json!({ "detail": err.to_string() }))
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    with_cors(response)
}

fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    with_cors(response)
}

fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        header::HeaderValue::from_static("POST, GET"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        header::HeaderValue::from_static("*"),
    );
    response
}
