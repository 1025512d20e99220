//! Extraction prompts for the builtin vision backends.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — each backend's extraction behaviour is
//!    defined in exactly one place, next to its siblings, so the differences
//!    between backends are visible at a glance.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    spinning up a vision model.

/// Nanonets-style rich extraction: tables as HTML, equations as LaTeX,
/// described images, tagged watermarks and page numbers.
pub const NANONETS_PROMPT: &str = "Extract the text from the above document as if you were reading it naturally. Return the tables in html format. Return the equations in LaTeX representation. If there is an image in the document and image caption is not present, add a small description of the image inside the <img></img> tag; otherwise, add the image caption inside <img></img>. Watermarks should be wrapped in brackets. Ex: <watermark>OFFICIAL COPY</watermark>. Page numbers should be wrapped in brackets. Ex: <page_number>14</page_number> or <page_number>9/22</page_number>. Prefer using \u{2610} and \u{2611} for check boxes.";

/// Plain-text extraction preserving reading order. Shared by the olmocr and
/// dotsocr backends; olmocr engines answer with a JSON envelope that the
/// backend unwraps (see `crate::backend::vision`).
pub const PLAIN_TEXT_PROMPT: &str = "Extract all text from this document image, preserving the original reading order and layout structure. Return the plain text representation.";

/// Whole-document Markdown conversion for the marker backend, which sees all
/// pages of a document in a single call and answers with one joined result.
pub const MARKER_PROMPT: &str = "Convert this document to clean, well-structured Markdown. Preserve all text content in reading order across every page. Convert tables to Markdown pipe format and mathematical notation to LaTeX. Output only the document content, without commentary and without wrapping the result in code fences.";
