//! Server binary for ocr-hub.
//!
//! A thin shim over the library crate that maps env-backed CLI flags to
//! `ServiceConfig` and runs the axum server.

use anyhow::{Context, Result};
use clap::Parser;
use ocr_hub::ServiceConfig;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # All defaults: marker,nanonets,olmocr on 0.0.0.0:8080, auth disabled
  ocr-hub

  # Pin the enabled set and require an API key
  ENABLED_SERVICES=nanonets,olmocr API_KEY=secret ocr-hub

  # Higher-resolution rendering for small-font scans
  ocr-hub --dpi 220 --port 9000

ENVIRONMENT VARIABLES:
  EDGEQUAKE_LLM_PROVIDER  Inference provider for the vision backends
                          (openai, anthropic, gemini, ollama, or any
                          OpenAI-compatible endpoint); auto-detected from
                          API-key variables when unset
  MARKER_MODEL            Served model id for the marker backend
  NANONETS_MODEL          Served model id for the nanonets backend
  OLMOCR_MODEL            Served model id for the olmocr backend
  DOTSOCR_MODEL           Served model id for the dotsocr backend
  PDFIUM_LIB_PATH         Path to libpdfium for PDF rendering
"#;

/// Multi-backend OCR service over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-hub",
    version,
    about = "Serve OCR over HTTP with pluggable vision-model backends",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Comma-separated backend names to enable.
    #[arg(long, env = "ENABLED_SERVICES", default_value = "marker,nanonets,olmocr")]
    services: String,

    /// Listen host.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Pre-shared API key required in the x-api-key header of /ocr
    /// requests. Unset disables the check.
    #[arg(long, env = "API_KEY")]
    api_key: Option<String>,

    /// Maximum /ocr requests in flight per worker.
    #[arg(long, env = "OCR_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-request wall-clock budget in seconds.
    #[arg(long, env = "TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// PDF rendering DPI (72-400).
    #[arg(long, env = "RENDER_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Cap on either dimension of a rendered page, in pixels.
    #[arg(long, env = "MAX_RENDER_PIXELS", default_value_t = 2000)]
    max_render_pixels: u32,

    /// Parent directory for per-request staging storage.
    #[arg(long, env = "STAGING_DIR")]
    staging_dir: Option<std::path::PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut builder = ServiceConfig::builder()
        .enabled_backends(cli.services.split(','))
        .host(cli.host)
        .port(cli.port)
        .concurrency(cli.concurrency)
        .request_timeout_secs(cli.timeout)
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_render_pixels);

    if let Some(key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(dir) = cli.staging_dir {
        builder = builder.staging_dir(dir);
    }

    let config = builder.build().context("Invalid configuration")?;

    ocr_hub::serve(config).await.context("Server failed")
}
