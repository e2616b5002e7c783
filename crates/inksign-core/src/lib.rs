//! Signature stamping pipeline
//!
//! This crate composites raster signature images onto pages of an existing
//! PDF using lopdf. The pipeline, leaf to root:
//! - `coords`: normalized (0-100, top-left origin) rectangles to absolute
//!   page coordinates (points, bottom-left origin)
//! - `decode`: base64 payloads (with or without a data-URL prefix) to
//!   raster images
//! - `compositor`: overlays decoded images onto one page as image XObjects
//! - `rewriter`: applies a batch of placements across a whole document and
//!   rewrites the stored file atomically

pub mod compositor;
pub mod coords;
pub mod decode;
pub mod error;
pub mod rewriter;

use serde::{Deserialize, Serialize};

pub use compositor::{composite_page, PageStamp};
pub use coords::{NormalizedRect, PageRect};
pub use decode::{decode_image_payload, decode_placement_image, ensure_png};
pub use error::StampError;
pub use rewriter::{apply_placements, stamp_document};

/// One signature image bound to a page and a normalized rectangle.
///
/// This is the wire shape clients submit: `image` is a base64 string that
/// may carry a `data:image/<type>;base64,` prefix, the rectangle fields are
/// percentages of the page dimensions with the origin at the page top-left,
/// and `page` is 1-indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub image: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub page: u32,
}

impl Placement {
    /// The normalized rectangle part of the placement.
    pub fn region(&self) -> NormalizedRect {
        NormalizedRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Parse PDF bytes and return the page count.
pub fn get_page_count(bytes: &[u8]) -> Result<u32, StampError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| StampError::SourceUnavailable(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}
