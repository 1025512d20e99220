//! # ocr-hub
//!
//! A multi-backend OCR service: accepts an uploaded document (PDF or
//! raster image, including animated sequences), normalises it into an
//! ordered run of page images, routes those pages to one of several
//! interchangeable text-extraction backends, and returns the joined text.
//!
//! The extraction itself is delegated to heavyweight vision-model engines
//! treated as opaque collaborators. What this crate owns is the
//! orchestration around them:
//!
//! - a **registry** that constructs each expensive, often GPU-bound engine
//!   at most once per worker process, lazily and safely under concurrent
//!   first use, and serializes invocation for engines that are not
//!   re-entrant;
//! - a **normalizer** that reduces every supported container to the same
//!   canonical page sequence and guarantees its staging storage never
//!   outlives the request;
//! - an **orchestrator** that retries accelerator exhaustion exactly once,
//!   cleans up on every exit path, and maps each failure into a closed
//!   error taxonomy with stable external status codes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Normalize  decode container → ordered RGB pages (spawn_blocking)
//!  ├─ 2. Resolve    registry: lazy once-per-process backend construction
//!  ├─ 3. Process    engine invocation, one bounded retry on exhaustion
//!  ├─ 4. Join       page texts joined with a fixed page-break marker
//!  └─ 5. Teardown   pages dropped, best-effort accelerator reclamation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_hub::{Orchestrator, Registry, ServiceConfig, UploadedDocument};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::default();
//!     let registry = Registry::with_builtins(&config.enabled_backends);
//!     let orchestrator = Orchestrator::new(Arc::new(registry), config);
//!
//!     let bytes = std::fs::read("scan.png")?;
//!     let doc = UploadedDocument::new("scan.png", bytes);
//!     let text = orchestrator.handle("nanonets", doc).await?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum router, auth middleware, and the `ocr-hub` binary |
//!
//! Disable `server` when embedding only the orchestration core:
//! ```toml
//! ocr-hub = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod gpu;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::registry::Registry;
pub use backend::{builtin_descriptors, BackendDescriptor, OcrBackend};
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use document::{PageImage, UploadedDocument};
pub use error::{ErrorBody, OcrError};
pub use orchestrator::{Orchestrator, PAGE_BREAK};
#[cfg(feature = "server")]
pub use server::{build_router, serve, AppState};
