//! Document rewriting
//!
//! Applies a batch of placements across a whole PDF and persists the
//! result over the original file. The full output is serialized into a
//! buffer first and the canonical path is replaced with a temp-write plus
//! rename, so a reader never observes a partially-written document and a
//! failure at any earlier step leaves the original intact.

use lopdf::Document;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compositor::{composite_page, PageStamp};
use crate::decode::decode_placement_image;
use crate::error::StampError;
use crate::Placement;

/// Composite `placements` into an already-loaded document.
///
/// Every payload is decoded up front so a malformed placement cannot leave
/// a half-stamped document. Pages are visited in source order; pages with
/// no matching placements are carried through untouched, and placements
/// naming a page the document does not have are dropped. Returns the
/// number of placements applied.
pub fn apply_placements(doc: &mut Document, placements: &[Placement]) -> Result<usize, StampError> {
    let mut by_page: BTreeMap<u32, Vec<PageStamp>> = BTreeMap::new();
    for placement in placements {
        let stamp = PageStamp {
            image: decode_placement_image(&placement.image)?,
            region: placement.region(),
        };
        by_page.entry(placement.page).or_default().push(stamp);
    }

    let mut applied = 0;
    // Page dimensions come from the document on every call; nothing is
    // cached across invocations.
    let pages = doc.get_pages();
    for (page_no, page_id) in pages {
        if let Some(stamps) = by_page.remove(&page_no) {
            composite_page(doc, page_id, &stamps)?;
            applied += stamps.len();
        }
    }
    Ok(applied)
}

/// Stamp the PDF stored at `path` in place.
///
/// The write runs to completion once started: output is fully buffered,
/// written to a temporary sibling path, and renamed over the original.
/// Callers serialize concurrent invocations against the same path.
pub fn stamp_document(path: &Path, placements: &[Placement]) -> Result<usize, StampError> {
    let mut doc =
        Document::load(path).map_err(|e| StampError::SourceUnavailable(e.to_string()))?;

    let applied = apply_placements(&mut doc, placements)?;

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| StampError::OperationError(format!("failed to serialize output: {}", e)))?;

    replace_atomic(path, &buffer)?;
    Ok(applied)
}

fn replace_atomic(path: &Path, bytes: &[u8]) -> Result<(), StampError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)
        .map_err(|e| StampError::OperationError(format!("failed to stage output: {}", e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StampError::OperationError(format!("failed to replace document: {}", e))
    })
}
