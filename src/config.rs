//! Service configuration.
//!
//! All orchestration behaviour is controlled through [`ServiceConfig`], built
//! via its [`ServiceConfigBuilder`] and read exactly once at process start.
//! Nothing here is re-read mid-process: the enabled-backend set, listen
//! address, and render settings are fixed for the lifetime of a worker, which
//! is what makes the registry's immutable-after-discovery guarantee hold.

use std::fmt;
use std::path::PathBuf;

use crate::error::OcrError;

/// Configuration for one worker process.
///
/// Built via [`ServiceConfig::builder()`] or [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use ocr_hub::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .dpi(150)
///     .concurrency(4)
///     .enabled_backends(["marker", "nanonets"])
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Backend names allowed to serve requests. Default: `marker`,
    /// `nanonets`, `olmocr`.
    ///
    /// Registered implementations whose name is not in this list are
    /// invisible: `/services` does not report them and requests for them
    /// fail with `backend_not_found`. The list is consumed once at startup.
    pub enabled_backends: Vec<String>,

    /// Listen host. Default: `0.0.0.0`.
    pub host: String,

    /// Listen port. Default: 8080.
    pub port: u16,

    /// Pre-shared API key required in the `x-api-key` header of `/ocr`
    /// requests. `None` disables the check (logged loudly at startup).
    pub api_key: Option<String>,

    /// Maximum `/ocr` requests in flight per worker. Default: 4.
    ///
    /// Backend calls hold accelerator memory for seconds to minutes, so the
    /// useful width is small; throughput scales by adding worker processes,
    /// not by widening this.
    pub concurrency: usize,

    /// Per-request wall-clock budget in seconds, enforced at the transport
    /// layer. Default: 120.
    pub request_timeout_secs: u64,

    /// Rendering DPI for PDF pages. Range 72–400, default 150.
    ///
    /// 150 DPI keeps text sharp enough for a vision model while holding page
    /// bitmaps to a few megabytes. Raise it for small-font scans.
    pub dpi: u32,

    /// Cap on either dimension of a rendered page, in pixels. Default: 2000.
    ///
    /// Page sizes vary wildly; an A0 poster at 150 DPI would be a
    /// 12,000-pixel-wide bitmap. The cap bounds memory independent of DPI.
    pub max_rendered_pixels: u32,

    /// Parent directory for per-request staging storage. `None` uses the
    /// system temp dir. Each request stages under its own unique directory,
    /// removed on every exit path.
    pub staging_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled_backends: vec![
                "marker".to_string(),
                "nanonets".to_string(),
                "olmocr".to_string(),
            ],
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_key: None,
            concurrency: 4,
            request_timeout_secs: 120,
            dpi: 150,
            max_rendered_pixels: 2000,
            staging_dir: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("enabled_backends", &self.enabled_backends)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("concurrency", &self.concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("staging_dir", &self.staging_dir)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` pair for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn enabled_backends<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.enabled_backends = names
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, OcrError> {
        let c = &self.config;
        if c.enabled_backends.is_empty() {
            return Err(OcrError::Internal(
                "configuration error: no backends enabled".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(OcrError::Internal(
                "configuration error: concurrency must be >= 1".into(),
            ));
        }
        Ok(self.config)
    }
}
