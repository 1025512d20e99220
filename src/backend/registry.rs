//! The backend registry: name → lazily constructed, process-wide instance.
//!
//! Discovery happens once, at construction, from the statically registered
//! descriptor list filtered by the configured enabled-set; after that the
//! registry is immutable. Instance construction is deferred to the first
//! `resolve` of each name because engines are expensive and may claim
//! accelerator memory the process should not hold until a request needs it.
//!
//! ## Initialization contract
//!
//! Each name has its own async lock held across construction, which gives
//! exactly the semantics the service needs:
//!
//! - concurrent first-use callers queue; precisely one runs the factory and
//!   every caller observes the same instance for the process lifetime;
//! - a factory failure caches nothing — the next caller retries, since
//!   first-use failures are often transient resource contention at startup.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{BackendDescriptor, OcrBackend};
use crate::document::PageImage;
use crate::error::OcrError;

struct Slot {
    descriptor: BackendDescriptor,
    instance: Mutex<Option<ResolvedBackend>>,
}

/// Process-scoped registry of enabled backends. Constructed once at startup
/// and shared (behind an `Arc`) by every request handler.
pub struct Registry {
    slots: HashMap<&'static str, Slot>,
}

impl Registry {
    /// Register every descriptor whose name appears in `enabled`.
    ///
    /// Enabled names with no matching implementation are logged and
    /// skipped; they must not take a slot that `/services` would report.
    pub fn new(descriptors: Vec<BackendDescriptor>, enabled: &[String]) -> Self {
        let mut slots = HashMap::new();
        for descriptor in descriptors {
            if !enabled.iter().any(|n| n == descriptor.name) {
                continue;
            }
            info!(backend = descriptor.name, "registered ocr backend");
            slots.insert(
                descriptor.name,
                Slot {
                    descriptor,
                    instance: Mutex::new(None),
                },
            );
        }
        for name in enabled {
            if !slots.contains_key(name.as_str()) {
                warn!(backend = %name, "enabled backend has no implementation");
            }
        }
        Self { slots }
    }

    /// Registry over the builtin implementation list.
    pub fn with_builtins(enabled: &[String]) -> Self {
        Self::new(super::builtin_descriptors(), enabled)
    }

    /// The enabled, discovered backend names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.keys().map(|n| n.to_string()).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a name to its process-wide instance, constructing it on
    /// first use.
    ///
    /// Idempotent per (process, name): every successful call returns a
    /// handle to the same instance. Construction failures surface as
    /// [`OcrError::BackendInitFailed`] and are not cached.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedBackend, OcrError> {
        let slot = self.slots.get(name).ok_or_else(|| OcrError::BackendNotFound {
            name: name.to_string(),
            enabled: self.names(),
        })?;

        let mut guard = slot.instance.lock().await;
        if let Some(resolved) = guard.as_ref() {
            return Ok(resolved.clone());
        }

        // Construction may block on model loading; keep it off the async
        // worker threads. Holding `guard` across the await is what
        // serializes concurrent first-use callers.
        let factory = Arc::clone(&slot.descriptor.factory);
        let backend = tokio::task::spawn_blocking(move || factory())
            .await
            .map_err(|e| OcrError::Internal(format!("backend init task panicked: {e}")))?
            .map_err(|e| match e {
                init @ OcrError::BackendInitFailed { .. } => init,
                other => OcrError::BackendInitFailed {
                    name: name.to_string(),
                    detail: other.to_string(),
                },
            })?;

        let resolved = ResolvedBackend {
            backend,
            gate: slot
                .descriptor
                .exclusive
                .then(|| Arc::new(Mutex::new(()))),
        };
        *guard = Some(resolved.clone());
        info!(backend = name, "backend instance constructed");
        Ok(resolved)
    }
}

/// A handle to a constructed backend instance plus its concurrency
/// contract. Cloning is cheap; all clones share the instance and, for
/// exclusive backends, the same invocation gate.
#[derive(Clone)]
pub struct ResolvedBackend {
    backend: Arc<dyn OcrBackend>,
    gate: Option<Arc<Mutex<()>>>,
}

impl std::fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedBackend")
            .field("backend", &self.backend.name())
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl ResolvedBackend {
    pub fn name(&self) -> String {
        self.backend.name().to_string()
    }

    /// Invoke the engine, holding the per-instance gate for the duration of
    /// the call when the descriptor declared serialized access.
    pub async fn process(&self, pages: &[PageImage]) -> Result<Vec<String>, OcrError> {
        match &self.gate {
            Some(gate) => {
                let _held = gate.lock().await;
                self.backend.process(pages).await
            }
            None => self.backend.process(pages).await,
        }
    }

    pub fn reclaim_memory(&self) {
        self.backend.reclaim_memory()
    }

    /// Instance identity, for tests asserting idempotent resolution.
    pub fn instance_ptr(&self) -> *const () {
        Arc::as_ptr(&self.backend) as *const ()
    }
}
