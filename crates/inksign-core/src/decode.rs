//! Decoding of client-submitted signature image payloads
//!
//! Payloads arrive as base64 strings, optionally wrapped in a
//! `data:image/<type>;base64,` prefix as produced by canvas `toDataURL`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::RgbaImage;

use crate::error::StampError;

/// The 8-byte PNG file signature.
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Decode a base64 image payload into raw bytes.
///
/// Any data-URL prefix is stripped by splitting on the first comma and
/// keeping the tail; a bare base64 string passes through unchanged.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, StampError> {
    let encoded = match payload.split_once(',') {
        Some((_, tail)) => tail,
        None => payload,
    };
    BASE64
        .decode(encoded.trim())
        .map_err(|e| StampError::DecodeError(e.to_string()))
}

/// Verify that `bytes` begin with the PNG signature.
///
/// Signature-asset uploads are restricted to PNG; finalization placements
/// skip this check and accept anything the raster library loads.
pub fn ensure_png(bytes: &[u8]) -> Result<(), StampError> {
    if bytes.len() < PNG_MAGIC.len() || bytes[..PNG_MAGIC.len()] != PNG_MAGIC {
        return Err(StampError::FormatError(
            "payload is not a PNG image".into(),
        ));
    }
    Ok(())
}

/// Decode a placement payload all the way to an RGBA raster.
pub fn decode_placement_image(payload: &str) -> Result<RgbaImage, StampError> {
    let bytes = decode_image_payload(payload)?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| StampError::FormatError(e.to_string()))?;
    Ok(img.to_rgba8())
}
