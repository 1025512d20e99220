//! Request-scoped data types: the uploaded document and its decoded pages.
//!
//! Both types are exclusively owned by one in-flight request and never shared
//! across requests. Dropping them is the release path the orchestrator relies
//! on — there is deliberately no cache, pool, or other way for a page bitmap
//! to outlive the request that produced it.

use image::{Rgb, RgbImage, RgbaImage};

/// A raw upload as received at the boundary: bytes plus the declared
/// filename. Immutable once constructed; consumed by normalization and never
/// persisted beyond the request.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }

    /// Lowercased extension of the declared filename, if any.
    pub fn extension(&self) -> Option<String> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// One decoded unit of visual content in the canonical pixel format
/// (8-bit RGB): a PDF page, an animation frame, or a whole static image.
///
/// `index` is the zero-based position in reading order.
#[derive(Debug)]
pub struct PageImage {
    pub index: usize,
    pub image: RgbImage,
}

impl PageImage {
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Composite an RGBA bitmap onto a white background.
///
/// Transparent regions become white rather than black, so content drawn on a
/// transparent canvas survives the flatten to 3 channels.
pub fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let px = rgba.get_pixel(x, y);
        let alpha = px[3] as u32;
        let blend = |c: u8| -> u8 { ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8 };
        Rgb([blend(px[0]), blend(px[1]), blend(px[2])])
    })
}
