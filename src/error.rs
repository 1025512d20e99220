//! Error taxonomy for the OCR service.
//!
//! Every failure a request can produce is one of the variants of
//! [`OcrError`] — a closed set, each with a fixed external status code and a
//! structured detail payload. The taxonomy is deliberately small: transport
//! handlers match on it, clients program against it, and tests assert on it,
//! so adding a variant is an API change.
//!
//! The mapping to an external response body lives in [`ErrorBody`], a pure
//! conversion with no I/O and no retry logic of its own. Retry policy is the
//! orchestrator's job (`crate::orchestrator`); keeping it out of here means
//! the taxonomy can be tested without a transport or a backend in sight.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::pipeline::normalize::SUPPORTED_EXTENSIONS;

/// All failures produced by normalization, backend resolution, and backend
/// invocation.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// Upload extension is not in the supported allow-list.
    #[error("unsupported file format: '{extension}'")]
    UnsupportedFormat { extension: String },

    /// The container could not be decoded into at least one page.
    #[error("cannot process document '{filename}': {detail}")]
    CorruptDocument { filename: String, detail: String },

    /// Requested backend name is not registered or not enabled.
    #[error("ocr backend '{name}' not found")]
    BackendNotFound { name: String, enabled: Vec<String> },

    /// First-use construction of the backend failed. Not cached — a later
    /// request may retry construction.
    #[error("backend '{name}' failed to initialize: {detail}")]
    BackendInitFailed { name: String, detail: String },

    /// Accelerator memory was exhausted; `retried` records whether the
    /// orchestrator's single retry was already spent.
    #[error("accelerator out of memory in backend '{name}'")]
    ResourceExhausted { name: String, retried: bool },

    /// The backend raised a non-resource error during processing.
    #[error("backend '{name}' processing failed: {detail}")]
    BackendProcessingError { name: String, detail: String },

    /// Unexpected host-level fault (a panicked worker task, a poisoned
    /// runtime). Not part of any documented flow.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// Stable external type tag, used as the `type` field of error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            OcrError::UnsupportedFormat { .. } => "unsupported_format",
            OcrError::CorruptDocument { .. } => "corrupt_document",
            OcrError::BackendNotFound { .. } => "backend_not_found",
            OcrError::BackendInitFailed { .. } => "backend_init_failed",
            OcrError::ResourceExhausted { .. } => "resource_exhausted",
            OcrError::BackendProcessingError { .. } => "backend_processing_error",
            OcrError::Internal(_) => "internal_error",
        }
    }

    /// External HTTP status for this failure.
    pub fn status(&self) -> u16 {
        match self {
            OcrError::UnsupportedFormat { .. } => 400,
            OcrError::CorruptDocument { .. } => 422,
            OcrError::BackendNotFound { .. } => 404,
            OcrError::BackendInitFailed { .. } => 500,
            OcrError::ResourceExhausted { .. } => 503,
            OcrError::BackendProcessingError { .. } => 500,
            OcrError::Internal(_) => 500,
        }
    }

    /// Structured diagnostic payload. Enough to diagnose the failure without
    /// exposing internal stack state.
    pub fn details(&self) -> Value {
        match self {
            OcrError::UnsupportedFormat { extension } => json!({
                "format": extension,
                "supported": SUPPORTED_EXTENSIONS,
            }),
            OcrError::CorruptDocument { filename, detail } => json!({
                "filename": filename,
                "error": detail,
            }),
            OcrError::BackendNotFound { name, enabled } => json!({
                "service": name,
                "enabled": enabled,
            }),
            OcrError::BackendInitFailed { name, detail } => json!({
                "service": name,
                "error": detail,
            }),
            OcrError::ResourceExhausted { name, retried } => json!({
                "service": name,
                "retry_attempted": retried,
            }),
            OcrError::BackendProcessingError { name, detail } => json!({
                "service": name,
                "error": detail,
            }),
            OcrError::Internal(detail) => json!({ "error": detail }),
        }
    }

    /// True for the one condition the orchestrator retries: accelerator
    /// memory exhaustion during backend invocation.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, OcrError::ResourceExhausted { .. })
    }
}

/// External error response body: `{ "error", "details", "type" }`.
///
/// A pure function of the error — building one performs no I/O, so the
/// external contract can be asserted in unit tests without a server.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: Value,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&OcrError> for ErrorBody {
    fn from(err: &OcrError) -> Self {
        ErrorBody {
            error: err.to_string(),
            details: err.details(),
            kind: err.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        let cases = [
            (
                OcrError::UnsupportedFormat {
                    extension: "txt".into(),
                },
                400,
            ),
            (
                OcrError::CorruptDocument {
                    filename: "a.png".into(),
                    detail: "bad header".into(),
                },
                422,
            ),
            (
                OcrError::BackendNotFound {
                    name: "nope".into(),
                    enabled: vec![],
                },
                404,
            ),
            (
                OcrError::BackendInitFailed {
                    name: "marker".into(),
                    detail: "no api key".into(),
                },
                500,
            ),
            (
                OcrError::ResourceExhausted {
                    name: "olmocr".into(),
                    retried: true,
                },
                503,
            ),
            (
                OcrError::BackendProcessingError {
                    name: "marker".into(),
                    detail: "engine fault".into(),
                },
                500,
            ),
            (OcrError::Internal("boom".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "wrong status for {err}");
        }
    }

    #[test]
    fn unsupported_format_carries_allow_list() {
        let err = OcrError::UnsupportedFormat {
            extension: "txt".into(),
        };
        let details = err.details();
        assert_eq!(details["format"], "txt");
        let supported: Vec<String> =
            serde_json::from_value(details["supported"].clone()).unwrap();
        assert!(supported.contains(&"pdf".to_string()));
        assert!(supported.contains(&"gif".to_string()));
    }

    #[test]
    fn not_found_lists_enabled_names() {
        let err = OcrError::BackendNotFound {
            name: "doesnotexist".into(),
            enabled: vec!["marker".into(), "nanonets".into()],
        };
        let details = err.details();
        assert_eq!(details["enabled"], json!(["marker", "nanonets"]));
    }

    #[test]
    fn body_has_stable_type_tag() {
        let err = OcrError::ResourceExhausted {
            name: "nanonets".into(),
            retried: true,
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.kind, "resource_exhausted");
        assert_eq!(body.details["retry_attempted"], json!(true));
        assert!(body.error.contains("nanonets"));
    }

    #[test]
    fn only_exhaustion_is_retryable() {
        assert!(OcrError::ResourceExhausted {
            name: "x".into(),
            retried: false
        }
        .is_resource_exhaustion());
        assert!(!OcrError::BackendProcessingError {
            name: "x".into(),
            detail: "y".into()
        }
        .is_resource_exhaustion());
        assert!(!OcrError::Internal("z".into()).is_resource_exhaustion());
    }
}
