//! Page compositing
//!
//! Overlays decoded signature images onto one page of a loaded PDF. Each
//! image becomes an XObject with zlib-compressed RGB samples and, when the
//! source carries transparency, an SMask stream for the alpha channel, so
//! the original page content stays visible wherever the stamp is
//! transparent. Draw operators stretch each image to exactly fill its
//! mapped rectangle; aspect ratio is not preserved.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbaImage;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

use crate::coords::NormalizedRect;
use crate::error::StampError;

/// One decoded image bound to its normalized page region.
pub struct PageStamp {
    pub image: RgbaImage,
    pub region: NormalizedRect,
}

/// Page-tree walks stop after this many parent hops.
const MAX_TREE_DEPTH: usize = 32;

fn op_err<E: std::fmt::Display>(e: E) -> StampError {
    StampError::OperationError(e.to_string())
}

/// Overlay `stamps` onto `page_id` in list order.
///
/// An empty stamp set leaves the document completely untouched. The
/// original content is wrapped in a graphics-state save/restore pair so an
/// unbalanced `q` in the existing stream cannot displace the overlay.
pub fn composite_page(
    doc: &mut Document,
    page_id: ObjectId,
    stamps: &[PageStamp],
) -> Result<(), StampError> {
    if stamps.is_empty() {
        return Ok(());
    }

    let (page_width, page_height) = page_size(doc, page_id)?;
    let mut resources = materialized_resources(doc, page_id)?;
    let mut xobjects = resource_xobjects(doc, &resources)?;

    // Restore the state saved by the prolog stream, then draw each stamp
    // inside its own save/restore with a matrix that stretches the unit
    // image square onto the mapped rectangle.
    let mut ops = String::from("Q\n");
    let mut name_seq = 0usize;
    for stamp in stamps {
        let xobject_id = embed_image(doc, &stamp.image)?;
        let name = loop {
            let candidate = format!("SigIm{}", name_seq);
            name_seq += 1;
            if !xobjects.has(candidate.as_bytes()) {
                break candidate;
            }
        };
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(xobject_id));

        let rect = stamp.region.to_page_rect(page_width, page_height);
        ops.push_str(&format!(
            "q\n{:.4} 0 0 {:.4} {:.4} {:.4} cm\n/{} Do\nQ\n",
            rect.width, rect.height, rect.x, rect.y, name
        ));
    }
    resources.set("XObject", Object::Dictionary(xobjects));

    let prolog_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));

    let existing = {
        let page = doc.get_object_mut(page_id).map_err(op_err)?;
        page.as_dict_mut().map_err(op_err)?.remove(b"Contents")
    };

    let mut contents = vec![Object::Reference(prolog_id)];
    match existing {
        Some(Object::Reference(id)) => contents.push(Object::Reference(id)),
        Some(Object::Array(array)) => contents.extend(array),
        Some(stream @ Object::Stream(_)) => {
            let id = doc.add_object(stream);
            contents.push(Object::Reference(id));
        }
        _ => {}
    }
    contents.push(Object::Reference(overlay_id));

    let page = doc.get_object_mut(page_id).map_err(op_err)?;
    let dict = page.as_dict_mut().map_err(op_err)?;
    dict.set("Resources", Object::Dictionary(resources));
    dict.set("Contents", Object::Array(contents));

    Ok(())
}

/// Physical page dimensions in points, from the page's (possibly
/// inherited) MediaBox.
pub fn page_size(doc: &Document, page_id: ObjectId) -> Result<(f64, f64), StampError> {
    let media_box = inherited_attr(doc, page_id, b"MediaBox")?
        .ok_or_else(|| StampError::OperationError("page has no MediaBox".into()))?;
    let values = media_box.as_array().map_err(op_err)?;
    if values.len() != 4 {
        return Err(StampError::OperationError(
            "MediaBox does not have 4 entries".into(),
        ));
    }
    let nums = values
        .iter()
        .map(object_to_f64)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs()))
}

/// Look up `key` on the page dictionary, walking Parent links for
/// attributes inherited from the page tree. References are resolved.
fn inherited_attr(
    doc: &Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<Object>, StampError> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc
            .get_object(current)
            .map_err(op_err)?
            .as_dict()
            .map_err(op_err)?;
        if let Ok(value) = dict.get(key) {
            let resolved = match value {
                Object::Reference(id) => doc.get_object(*id).map_err(op_err)?.clone(),
                other => other.clone(),
            };
            return Ok(Some(resolved));
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// The page's effective Resources dictionary, cloned onto the page level.
///
/// Inherited resources must be copied down before the page grows its own
/// dictionary, otherwise the existing content loses its fonts.
fn materialized_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, StampError> {
    match inherited_attr(doc, page_id, b"Resources")? {
        Some(Object::Dictionary(dict)) => Ok(dict),
        Some(_) => Err(StampError::OperationError(
            "Resources is not a dictionary".into(),
        )),
        None => Ok(Dictionary::new()),
    }
}

fn resource_xobjects(doc: &Document, resources: &Dictionary) -> Result<Dictionary, StampError> {
    match resources.get(b"XObject") {
        Ok(Object::Dictionary(dict)) => Ok(dict.clone()),
        Ok(Object::Reference(id)) => Ok(doc
            .get_object(*id)
            .map_err(op_err)?
            .as_dict()
            .map_err(op_err)?
            .clone()),
        Ok(_) => Err(StampError::OperationError(
            "XObject entry is not a dictionary".into(),
        )),
        Err(_) => Ok(Dictionary::new()),
    }
}

fn object_to_f64(obj: &Object) -> Result<f64, StampError> {
    match obj {
        Object::Integer(i) => Ok(*i as f64),
        Object::Real(r) => Ok(*r as f64),
        _ => Err(StampError::OperationError(
            "MediaBox entry is not numeric".into(),
        )),
    }
}

/// Register the image as an XObject, with an SMask when any pixel is not
/// fully opaque. Sample rows are emitted in natural order; PDF image space
/// places the first row at the top of the unit square.
fn embed_image(doc: &mut Document, image: &RgbaImage) -> Result<ObjectId, StampError> {
    let (width, height) = image.dimensions();

    let mut rgb_buf = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha_buf = Vec::with_capacity((width * height) as usize);
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb_buf.extend_from_slice(&[r, g, b]);
        alpha_buf.push(a);
    }

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if alpha_buf.iter().any(|&a| a < u8::MAX) {
        let smask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha_buf)?,
        ));
        image_dict.set("SMask", Object::Reference(smask_id));
    }

    Ok(doc.add_object(Stream::new(image_dict, deflate(&rgb_buf)?)))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, StampError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(op_err)?;
    encoder.finish().map_err(op_err)
}
