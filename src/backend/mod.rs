//! Text-extraction backends.
//!
//! A backend is a pluggable engine exposing one uniform contract: take the
//! request's page images, return extracted text. Everything engine-specific
//! — which model, which prompt, whether pages go one call at a time or all
//! at once — lives behind [`OcrBackend`]; the orchestrator and transport
//! never see past it.
//!
//! Implementations register through the statically compiled
//! [`builtin_descriptors`] list rather than any runtime discovery of
//! modules: what ships in the binary is exactly what can be resolved, and
//! the externally configured enabled-set then narrows that list at startup
//! (see [`registry::Registry`]).

pub mod registry;
pub mod vision;

use async_trait::async_trait;
use std::sync::Arc;

use crate::document::PageImage;
use crate::error::OcrError;
use crate::prompts;

/// A stateful, expensive-to-construct extraction engine bound to one worker
/// process. Constructed at most once per process by the registry; shared by
/// every request that names it; torn down only on process exit.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Stable external name of this backend.
    fn name(&self) -> &str;

    /// Extract text from the given pages.
    ///
    /// A backend may return one string per input page or a single joined
    /// string for the whole document — both are valid; the orchestrator
    /// joins whatever comes back with the fixed page-break marker.
    async fn process(&self, pages: &[PageImage]) -> Result<Vec<String>, OcrError>;

    /// Best-effort release of accelerator memory held by the engine.
    ///
    /// Called by the orchestrator between retry attempts and at request
    /// teardown. Must not block and must not fail loudly; engines with
    /// nothing to reclaim keep the default no-op.
    fn reclaim_memory(&self) {}
}

/// Constructor deferred to first use: construction is expensive and may
/// claim accelerator resources the process should not hold until needed.
pub type BackendFactory = Arc<dyn Fn() -> Result<Arc<dyn OcrBackend>, OcrError> + Send + Sync>;

/// A registered implementation: stable name, concurrency contract, and the
/// deferred constructor. Immutable once discovery completes.
#[derive(Clone)]
pub struct BackendDescriptor {
    pub name: &'static str,

    /// True when the underlying engine is not safe for concurrent
    /// invocation: the registry then serializes `process` calls to the one
    /// instance, and throughput for this backend comes from running more
    /// worker processes instead.
    pub exclusive: bool,

    pub factory: BackendFactory,
}

impl BackendDescriptor {
    pub fn new<F>(name: &'static str, exclusive: bool, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn OcrBackend>, OcrError> + Send + Sync + 'static,
    {
        Self {
            name,
            exclusive,
            factory: Arc::new(factory),
        }
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

/// The statically compiled registration list.
///
/// Single-stream accelerator engines (`nanonets`, `olmocr`, `dotsocr`) are
/// marked exclusive; `marker` batches a whole document per call and its
/// serving stack queues internally, so it accepts concurrent invocation.
pub fn builtin_descriptors() -> Vec<BackendDescriptor> {
    use vision::{InvocationShape, ModelSpec, OutputParse, VisionBackend};

    let specs = [
        (
            ModelSpec {
                name: "marker",
                prompt: prompts::MARKER_PROMPT,
                parse: OutputParse::Plain,
                shape: InvocationShape::WholeDocument,
                max_tokens: 4096,
                model_env: "MARKER_MODEL",
                default_model: "gpt-4.1-nano",
            },
            false,
        ),
        (
            ModelSpec {
                name: "nanonets",
                prompt: prompts::NANONETS_PROMPT,
                parse: OutputParse::Plain,
                shape: InvocationShape::PerPage,
                max_tokens: 4096,
                model_env: "NANONETS_MODEL",
                default_model: "nanonets/Nanonets-OCR-s",
            },
            true,
        ),
        (
            ModelSpec {
                name: "olmocr",
                prompt: prompts::PLAIN_TEXT_PROMPT,
                parse: OutputParse::NaturalText,
                shape: InvocationShape::PerPage,
                max_tokens: 8096,
                model_env: "OLMOCR_MODEL",
                default_model: "allenai/olmOCR-7B-0225-preview",
            },
            true,
        ),
        (
            ModelSpec {
                name: "dotsocr",
                prompt: prompts::PLAIN_TEXT_PROMPT,
                parse: OutputParse::Plain,
                shape: InvocationShape::PerPage,
                max_tokens: 8096,
                model_env: "DOTSOCR_MODEL",
                default_model: "rednote-hilab/dots.ocr",
            },
            true,
        ),
    ];

    specs
        .into_iter()
        .map(|(spec, exclusive)| {
            BackendDescriptor::new(spec.name, exclusive, move || VisionBackend::create(spec))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_list_is_stable() {
        let names: Vec<&str> = builtin_descriptors().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["marker", "nanonets", "olmocr", "dotsocr"]);
    }

    #[test]
    fn single_stream_engines_are_exclusive() {
        for d in builtin_descriptors() {
            let expect = d.name != "marker";
            assert_eq!(d.exclusive, expect, "{}", d.name);
        }
    }
}
