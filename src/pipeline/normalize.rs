//! Page normalization: decode an upload into ordered, canonical page images.
//!
//! Every supported container reduces to the same thing — a non-empty,
//! ordered `Vec<PageImage>` in 8-bit RGB — so backends never see container
//! formats at all. Order is reading order: PDF page order, animation frame
//! order, or a single page for a static raster.
//!
//! ## Why spawn_blocking?
//!
//! pdfium wraps a C++ library with thread-local state that must not run on
//! async worker threads, and raster decoding is CPU-bound. The whole decode
//! runs on the blocking pool so a large upload cannot stall unrelated
//! requests sharing the dispatch path.
//!
//! ## Staging discipline
//!
//! pdfium requires a file-system path, so PDF bytes are staged into a
//! `TempDir` unique to this call. The directory lives entirely inside the
//! blocking closure: whatever the outcome — success, decode error, panic, or
//! the async caller abandoning the request — the `TempDir` drop removes it
//! before the closure finishes unwinding. No call leaves residue.

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::document::{flatten_onto_white, PageImage, UploadedDocument};
use crate::error::OcrError;

/// Extensions accepted at the boundary. Anything else is rejected before a
/// single byte is decoded.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "bmp", "gif"];

/// Decode an uploaded document into its ordered page images.
///
/// Fails with [`OcrError::UnsupportedFormat`] for extensions outside the
/// allow-list and [`OcrError::CorruptDocument`] for anything that cannot be
/// decoded into at least one page. Never returns an empty vector.
pub async fn normalize(
    doc: UploadedDocument,
    config: &ServiceConfig,
) -> Result<Vec<PageImage>, OcrError> {
    let extension = doc.extension().unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(OcrError::UnsupportedFormat { extension });
    }

    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let staging_parent = config.staging_dir.clone();

    tokio::task::spawn_blocking(move || {
        normalize_blocking(&doc, &extension, dpi, max_pixels, staging_parent.as_deref())
    })
    .await
    .map_err(|e| OcrError::Internal(format!("normalize task panicked: {e}")))?
}

fn normalize_blocking(
    doc: &UploadedDocument,
    extension: &str,
    dpi: u32,
    max_pixels: u32,
    staging_parent: Option<&Path>,
) -> Result<Vec<PageImage>, OcrError> {
    let pages = match extension {
        "pdf" => render_pdf(doc, dpi, max_pixels, staging_parent)?,
        "png" => decode_png(doc)?,
        "gif" => {
            let decoder =
                GifDecoder::new(Cursor::new(doc.data.as_slice())).map_err(|e| corrupt(doc, &e))?;
            collect_frames(doc, decoder)?
        }
        "jpg" | "jpeg" => decode_static(doc, ImageFormat::Jpeg)?,
        "bmp" => decode_static(doc, ImageFormat::Bmp)?,
        other => {
            return Err(OcrError::UnsupportedFormat {
                extension: other.to_string(),
            })
        }
    };

    if pages.is_empty() {
        return Err(OcrError::CorruptDocument {
            filename: doc.filename.clone(),
            detail: "no images extracted".to_string(),
        });
    }

    debug!(
        filename = %doc.filename,
        pages = pages.len(),
        "document normalized"
    );
    Ok(pages)
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// Stage the PDF bytes and rasterise every page at the configured DPI.
///
/// Rendering failure on any page fails the whole document: a partial page
/// set would silently drop content, which is worse than an honest error.
fn render_pdf(
    doc: &UploadedDocument,
    dpi: u32,
    max_pixels: u32,
    staging_parent: Option<&Path>,
) -> Result<Vec<PageImage>, OcrError> {
    let staging = match staging_parent {
        Some(parent) => TempDir::new_in(parent),
        None => TempDir::new(),
    }
    .map_err(|e| OcrError::Internal(format!("staging dir: {e}")))?;

    let pdf_path = staging.path().join("upload.pdf");
    std::fs::write(&pdf_path, &doc.data)
        .map_err(|e| OcrError::Internal(format!("staging write: {e}")))?;

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| OcrError::Internal(format!("pdfium binding failed: {e:?}")))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_file(&pdf_path, None)
        .map_err(|e| OcrError::CorruptDocument {
            filename: doc.filename.clone(),
            detail: format!("{e:?}"),
        })?;

    let total = document.pages().len() as usize;
    info!(filename = %doc.filename, pages = total, "PDF loaded");

    let mut pages = Vec::with_capacity(total);
    for (index, page) in document.pages().iter().enumerate() {
        // Page sizes vary within one document, so the DPI-derived pixel
        // width is computed per page and clamped to the configured cap.
        let scaled_width = (page.width().value * dpi as f32 / 72.0).round() as i32;
        let render_config = PdfRenderConfig::new()
            .set_target_width(scaled_width.clamp(1, max_pixels as i32))
            .set_maximum_height(max_pixels as i32);

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| OcrError::CorruptDocument {
                    filename: doc.filename.clone(),
                    detail: format!("page {}: {e:?}", index + 1),
                })?;
        let image = flatten_onto_white(&bitmap.as_image().to_rgba8());
        debug!(
            page = index + 1,
            width = image.width(),
            height = image.height(),
            "rendered page"
        );
        pages.push(PageImage::new(index, image));
    }

    // `staging` drops here, deleting the staged bytes on every path.
    Ok(pages)
}

// ── Raster images ────────────────────────────────────────────────────────

/// PNG is the one container that is ambiguous: an APNG carries a frame
/// sequence, a plain PNG a single image. Probe first, then pick the path.
fn decode_png(doc: &UploadedDocument) -> Result<Vec<PageImage>, OcrError> {
    let decoder = PngDecoder::new(Cursor::new(&doc.data)).map_err(|e| corrupt(doc, &e))?;
    let animated = decoder.is_apng().map_err(|e| corrupt(doc, &e))?;

    if animated {
        let apng = decoder.apng().map_err(|e| corrupt(doc, &e))?;
        collect_frames(doc, apng)
    } else {
        let image = DynamicImage::from_decoder(decoder).map_err(|e| corrupt(doc, &e))?;
        Ok(vec![PageImage::new(0, flatten_onto_white(&image.to_rgba8()))])
    }
}

/// Multi-frame containers: every frame becomes one page, in frame order.
fn collect_frames<'a>(
    doc: &UploadedDocument,
    decoder: impl AnimationDecoder<'a>,
) -> Result<Vec<PageImage>, OcrError> {
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| corrupt(doc, &e))?;

    Ok(frames
        .into_iter()
        .enumerate()
        .map(|(index, frame)| PageImage::new(index, flatten_onto_white(&frame.into_buffer())))
        .collect())
}

fn decode_static(
    doc: &UploadedDocument,
    format: ImageFormat,
) -> Result<Vec<PageImage>, OcrError> {
    let image =
        image::load_from_memory_with_format(&doc.data, format).map_err(|e| corrupt(doc, &e))?;
    Ok(vec![PageImage::new(0, flatten_onto_white(&image.to_rgba8()))])
}

fn corrupt(doc: &UploadedDocument, err: &dyn std::fmt::Display) -> OcrError {
    OcrError::CorruptDocument {
        filename: doc.filename.clone(),
        detail: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};

    fn config() -> ServiceConfig {
        ServiceConfig::default()
    }

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn gif_bytes(frames: Vec<RgbaImage>) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder
                .encode_frames(frames.into_iter().map(Frame::new))
                .unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn rejects_unsupported_extension() {
        let doc = UploadedDocument::new("notes.txt", b"hello".to_vec());
        let err = normalize(doc, &config()).await.unwrap_err();
        match err {
            OcrError::UnsupportedFormat { extension } => assert_eq!(extension, "txt"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_missing_extension() {
        let doc = UploadedDocument::new("README", b"hello".to_vec());
        let err = normalize(doc, &config()).await.unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn static_png_is_one_page() {
        let img = RgbaImage::from_pixel(8, 6, Rgba([40, 80, 120, 255]));
        let doc = UploadedDocument::new("scan.png", png_bytes(&img));
        let pages = normalize(doc, &config()).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index, 0);
        assert_eq!((pages[0].width(), pages[0].height()), (8, 6));
    }

    #[tokio::test]
    async fn transparent_png_is_flattened_onto_white() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let doc = UploadedDocument::new("ghost.png", png_bytes(&img));
        let pages = normalize(doc, &config()).await.unwrap();
        assert_eq!(pages[0].image.get_pixel(0, 0), &image::Rgb([255, 255, 255]));
    }

    #[tokio::test]
    async fn gif_frames_become_pages_in_order() {
        let red = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let blue = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let doc = UploadedDocument::new("anim.gif", gif_bytes(vec![red, blue]));
        let pages = normalize(doc, &config()).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].index, 0);
        assert_eq!(pages[1].index, 1);
        // GIF palettes may shift colours slightly; assert the dominant channel.
        let first = pages[0].image.get_pixel(0, 0);
        let second = pages[1].image.get_pixel(0, 0);
        assert!(first[0] > 180 && first[2] < 80, "frame 0 not red: {first:?}");
        assert!(second[2] > 180 && second[0] < 80, "frame 1 not blue: {second:?}");
    }

    #[tokio::test]
    async fn single_frame_gif_is_one_page() {
        let frame = RgbaImage::from_pixel(3, 3, Rgba([0, 255, 0, 255]));
        let doc = UploadedDocument::new("still.gif", gif_bytes(vec![frame]));
        let pages = normalize(doc, &config()).await.unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[tokio::test]
    async fn jpeg_and_bmp_decode_as_single_pages() {
        for format in [ImageFormat::Jpeg, ImageFormat::Bmp] {
            let mut buf = Vec::new();
            DynamicImage::ImageRgb8(image::RgbImage::from_pixel(5, 5, image::Rgb([9, 9, 9])))
                .write_to(&mut Cursor::new(&mut buf), format)
                .unwrap();
            let name = match format {
                ImageFormat::Jpeg => "page.jpg",
                _ => "page.bmp",
            };
            let pages = normalize(UploadedDocument::new(name, buf), &config())
                .await
                .unwrap();
            assert_eq!(pages.len(), 1, "{name}");
        }
    }

    #[tokio::test]
    async fn corrupt_png_is_a_corrupt_document() {
        let doc = UploadedDocument::new("broken.png", vec![0u8; 32]);
        let err = normalize(doc, &config()).await.unwrap_err();
        assert!(matches!(err, OcrError::CorruptDocument { .. }), "{err:?}");
        assert_eq!(err.status(), 422);
    }

    #[tokio::test]
    async fn staging_leaves_no_residue_on_failure() {
        let parent = tempfile::tempdir().unwrap();
        let cfg = ServiceConfig::builder()
            .staging_dir(parent.path())
            .build()
            .unwrap();

        // Garbage bytes behind a pdf extension force the staged-render path
        // to fail partway through; the staging directory must still vanish.
        let doc = UploadedDocument::new("broken.pdf", vec![0u8; 64]);
        let outcome = normalize(doc, &cfg).await;
        assert!(outcome.is_err());

        let residue: Vec<_> = std::fs::read_dir(parent.path()).unwrap().collect();
        assert!(residue.is_empty(), "staging residue: {residue:?}");
    }
}
