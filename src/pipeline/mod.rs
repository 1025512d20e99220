//! Pipeline stages between an upload and a backend invocation.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap an
//! implementation (e.g. the rendering engine) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ normalize ──▶ encode ──▶ backend ──▶ postprocess
//! (bytes)    (page RGBs)   (base64)   (engine)    (cleanup)
//! ```
//!
//! 1. [`normalize`] — decode the uploaded container into ordered page
//!    images; runs in `spawn_blocking` because pdfium and image decoding are
//!    CPU-bound
//! 2. [`encode`] — PNG-encode and base64-wrap each page for the multimodal
//!    request body
//! 3. [`postprocess`] — deterministic text-cleanup rules applied to whatever
//!    the engine returns

pub mod encode;
pub mod normalize;
pub mod postprocess;
