//! The request pipeline: normalize → resolve → invoke (with bounded retry)
//! → join.
//!
//! One request moves through a fixed sequence of states:
//!
//! ```text
//! Received → Normalizing → Resolving → Processing{attempt 1}
//!          → (success | exhaustion → Processing{attempt 2}) → Done
//! ```
//!
//! Two policies live here and nowhere else:
//!
//! - **Retry.** Only accelerator memory exhaustion during backend
//!   invocation is retried, and exactly once — after a best-effort
//!   reclamation. Normalization and resolution failures are input/config
//!   problems, not transient, and propagate untouched. A second exhaustion
//!   gives up with `retried: true`; more attempts would only stretch tail
//!   latency on a saturated accelerator.
//!
//! - **Cleanup.** Page bitmaps are owned by the request scope and dropped
//!   on every exit path; staging storage is dropped inside normalization;
//!   and a guard armed once a backend is resolved performs one final
//!   best-effort reclamation even when the surrounding future is dropped by
//!   transport cancellation. Cleanup failures are logged, never raised — a
//!   teardown hiccup must not shadow the request's real outcome.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::registry::{Registry, ResolvedBackend};
use crate::config::ServiceConfig;
use crate::document::{PageImage, UploadedDocument};
use crate::error::OcrError;
use crate::pipeline::normalize;

/// Fixed separator between the strings a backend returns — one literal page
/// break, whether the backend answered per page or per document.
pub const PAGE_BREAK: &str = "\n\n---\n\n";

/// Drives one request end to end. Cheap to share; holds no per-request
/// state.
pub struct Orchestrator {
    registry: Arc<Registry>,
    config: ServiceConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<Registry>, config: ServiceConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Process one uploaded document with the named backend.
    ///
    /// Returns the joined extracted text, or the first failure mapped into
    /// the service taxonomy. Whatever the outcome, no temporary state from
    /// this call survives its return.
    pub async fn handle(
        &self,
        backend_name: &str,
        doc: UploadedDocument,
    ) -> Result<String, OcrError> {
        let filename = doc.filename.clone();
        info!(backend = backend_name, filename = %filename, "request received");

        // Pages are owned by this scope: every return path below drops
        // them, which is the release the data model promises.
        let pages = normalize::normalize(doc, &self.config).await?;
        debug!(pages = pages.len(), "normalized");

        let resolved = self.registry.resolve(backend_name).await?;
        let _teardown = ReclaimGuard::arm(&resolved);

        let texts = self.invoke_with_retry(&resolved, &pages).await?;
        let joined = texts.join(PAGE_BREAK);

        info!(
            backend = backend_name,
            pages = pages.len(),
            chars = joined.len(),
            "request complete"
        );
        Ok(joined)
    }

    /// Invoke the backend, retrying exactly once on resource exhaustion.
    async fn invoke_with_retry(
        &self,
        resolved: &ResolvedBackend,
        pages: &[PageImage],
    ) -> Result<Vec<String>, OcrError> {
        match resolved.process(pages).await {
            Ok(texts) => Ok(texts),
            Err(first) if first.is_resource_exhaustion() => {
                warn!(
                    backend = %resolved.name(),
                    "accelerator exhausted; reclaiming and retrying once"
                );
                resolved.reclaim_memory();

                match resolved.process(pages).await {
                    Ok(texts) => Ok(texts),
                    Err(second) if second.is_resource_exhaustion() => {
                        Err(OcrError::ResourceExhausted {
                            name: resolved.name(),
                            retried: true,
                        })
                    }
                    Err(other) => Err(self.as_processing_error(resolved, other)),
                }
            }
            Err(other) => {
                resolved.reclaim_memory();
                Err(self.as_processing_error(resolved, other))
            }
        }
    }

    /// Coerce stray error kinds from an engine into the invocation
    /// taxonomy. Backends normally classify their own failures; anything
    /// else that leaks out of `process` is, by definition, a processing
    /// error.
    fn as_processing_error(&self, resolved: &ResolvedBackend, err: OcrError) -> OcrError {
        match err {
            e @ OcrError::BackendProcessingError { .. } => e,
            e @ OcrError::ResourceExhausted { .. } => e,
            other => OcrError::BackendProcessingError {
                name: resolved.name(),
                detail: other.to_string(),
            },
        }
    }
}

/// Runs the final best-effort accelerator reclamation exactly once per
/// request, on drop — which covers success, every failure kind, and the
/// caller abandoning the request mid-flight.
struct ReclaimGuard {
    resolved: ResolvedBackend,
}

impl ReclaimGuard {
    fn arm(resolved: &ResolvedBackend) -> Self {
        Self {
            resolved: resolved.clone(),
        }
    }
}

impl Drop for ReclaimGuard {
    fn drop(&mut self) {
        debug!(backend = %self.resolved.name(), "request teardown: reclaiming accelerator memory");
        self.resolved.reclaim_memory();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendDescriptor, OcrBackend};
    use crate::document::PageImage;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend whose first `fail_times` calls raise exhaustion, counting
    /// every attempt and every reclamation.
    struct ExhaustibleBackend {
        fail_times: usize,
        attempts: Arc<AtomicUsize>,
        reclaims: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OcrBackend for ExhaustibleBackend {
        fn name(&self) -> &str {
            "exhaustible"
        }

        async fn process(&self, pages: &[PageImage]) -> Result<Vec<String>, OcrError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_times {
                return Err(OcrError::ResourceExhausted {
                    name: "exhaustible".into(),
                    retried: false,
                });
            }
            Ok(pages.iter().map(|p| format!("text:{}", p.index)).collect())
        }

        fn reclaim_memory(&self) {
            self.reclaims.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FaultyBackend {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OcrBackend for FaultyBackend {
        fn name(&self) -> &str {
            "faulty"
        }

        async fn process(&self, _pages: &[PageImage]) -> Result<Vec<String>, OcrError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(OcrError::BackendProcessingError {
                name: "faulty".into(),
                detail: "engine fault".into(),
            })
        }
    }

    fn orchestrator_with(
        name: &'static str,
        backend: Arc<dyn OcrBackend>,
    ) -> Orchestrator {
        let descriptor =
            BackendDescriptor::new(name, false, move || Ok(Arc::clone(&backend)));
        let registry = Registry::new(vec![descriptor], &[name.to_string()]);
        Orchestrator::new(Arc::new(registry), ServiceConfig::default())
    }

    fn png_upload(name: &str) -> UploadedDocument {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])))
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        UploadedDocument::new(name, buf)
    }

    #[tokio::test]
    async fn success_joins_with_page_break() {
        let backend = Arc::new(ExhaustibleBackend {
            fail_times: 0,
            attempts: Arc::new(AtomicUsize::new(0)),
            reclaims: Arc::new(AtomicUsize::new(0)),
        });
        let orch = orchestrator_with("exhaustible", backend);

        let text = orch
            .handle("exhaustible", png_upload("doc.png"))
            .await
            .unwrap();
        assert_eq!(text, "text:0");
    }

    #[test]
    fn page_order_survives_the_join() {
        let texts = vec!["p1".to_string(), "p2".to_string(), "p3".to_string()];
        assert_eq!(texts.join(PAGE_BREAK), "p1\n\n---\n\np2\n\n---\n\np3");
    }

    #[tokio::test]
    async fn one_exhaustion_is_retried_and_recovers() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let reclaims = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(ExhaustibleBackend {
            fail_times: 1,
            attempts: Arc::clone(&attempts),
            reclaims: Arc::clone(&reclaims),
        });
        let orch = orchestrator_with("exhaustible", backend);

        let text = orch
            .handle("exhaustible", png_upload("doc.png"))
            .await
            .unwrap();
        assert_eq!(text, "text:0");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // One reclamation between attempts, one at teardown.
        assert_eq!(reclaims.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_exhaustion_is_bounded_to_two_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(ExhaustibleBackend {
            fail_times: usize::MAX,
            attempts: Arc::clone(&attempts),
            reclaims: Arc::new(AtomicUsize::new(0)),
        });
        let orch = orchestrator_with("exhaustible", backend);

        let err = orch
            .handle("exhaustible", png_upload("doc.png"))
            .await
            .unwrap_err();
        match err {
            OcrError::ResourceExhausted { retried, .. } => assert!(retried),
            other => panic!("expected ResourceExhausted, got {other:?}"),
        }
        assert_eq!(err.status(), 503);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_resource_errors_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(FaultyBackend {
            attempts: Arc::clone(&attempts),
        });
        let orch = orchestrator_with("faulty", backend);

        let err = orch
            .handle("faulty", png_upload("doc.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::BackendProcessingError { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn normalization_failure_never_reaches_the_backend() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(FaultyBackend {
            attempts: Arc::clone(&attempts),
        });
        let orch = orchestrator_with("faulty", backend);

        let err = orch
            .handle("faulty", UploadedDocument::new("notes.txt", b"hi".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_backend_fails_before_processing() {
        let backend = Arc::new(FaultyBackend {
            attempts: Arc::new(AtomicUsize::new(0)),
        });
        let orch = orchestrator_with("faulty", backend);

        let err = orch
            .handle("doesnotexist", png_upload("doc.png"))
            .await
            .unwrap_err();
        match err {
            OcrError::BackendNotFound { enabled, .. } => {
                assert_eq!(enabled, vec!["faulty"]);
            }
            other => panic!("expected BackendNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn teardown_reclaims_even_on_success() {
        let reclaims = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(ExhaustibleBackend {
            fail_times: 0,
            attempts: Arc::new(AtomicUsize::new(0)),
            reclaims: Arc::clone(&reclaims),
        });
        let orch = orchestrator_with("exhaustible", backend);

        orch.handle("exhaustible", png_upload("doc.png"))
            .await
            .unwrap();
        assert_eq!(reclaims.load(Ordering::SeqCst), 1);
    }
}
