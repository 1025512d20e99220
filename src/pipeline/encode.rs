//! Image encoding: [`PageImage`] → base64 PNG wrapped in `ImageData`.
//!
//! Vision APIs accept images as base64 data embedded in the JSON request
//! body. PNG is chosen over JPEG because it is lossless — text crispness
//! matters far more than payload size for extraction accuracy, and JPEG
//! artefacts on rendered text measurably degrade model output.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

use crate::document::PageImage;
use crate::error::OcrError;

/// Encode one page as a base64 PNG ready for a vision-model request.
///
/// `detail: "high"` instructs tiling vision models to spend their full image
/// token budget; without it fine print and small tables are lost.
pub fn encode_page(page: &PageImage) -> Result<ImageData, OcrError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(page.image.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::Internal(format!("page {} encode: {e}", page.index + 1)))?;

    let b64 = STANDARD.encode(&buf);
    debug!(page = page.index + 1, bytes = b64.len(), "page encoded");

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
