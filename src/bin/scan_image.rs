use anyhow::{Context, Result};
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use upc_scanner::config::AppConfig;
use upc_scanner::scanner::Scanner;

/// Scan one file and build its output line
fn scan_file(scanner: &Scanner, path: &Path) -> Result<serde_json::Value> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let line = match scanner.scan_bytes(&bytes) {
        Ok(report) => {
            let outcome = report.outcome.as_str();
            let attempts = report.attempts;
            match report.into_result() {
                Ok(result) => json!({
                    "file": path.display().to_string(),
                    "upc": result.main,
                    "extension": result.extension,
                    "outcome": outcome,
                    "attempts": attempts,
                }),
                Err(e) => json!({
                    "file": path.display().to_string(),
                    "error": e.to_string(),
                    "outcome": outcome,
                    "attempts": attempts,
                }),
            }
        }
        Err(e) => json!({
            "file": path.display().to_string(),
            "error": e.to_string(),
        }),
    };

    Ok(line)
}

/// Output line for one path; unreadable files become an error line
fn scan_line(scanner: &Scanner, path: &str) -> serde_json::Value {
    scan_file(scanner, Path::new(path)).unwrap_or_else(|e| {
        json!({
            "file": path,
            "error": format!("{:#}", e),
        })
    })
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays one JSON object per line
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("Usage: scan_image <image> [<image>...]");
        std::process::exit(2);
    }

    let config = AppConfig::from_env()?;
    config.validate()?;

    let scanner = Scanner::with_default_collaborators(
        config.normalizer,
        config.quality_gate,
        config.scan,
    );

    let mut failures = 0usize;
    for path in &paths {
        let line = scan_line(&scanner, path);
        if line.get("error").is_some() {
            failures += 1;
        }
        println!("{}", line);
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
