//! lopdf plumbing: load a template, read its page box, build an overlay
//! Form XObject and stamp it onto the first page.
//!
//! Stamping never touches the template's own content: the original content
//! streams are wrapped in `q … Q` so whatever graphics state they leave
//! behind cannot shift the overlay, and the overlay is drawn last.

use crate::error::BadgeError;
use image::{RgbImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// Resource name of the badge font inside the overlay.
pub const FONT_NAME: &str = "BadgeSans";

const OVERLAY_NAME: &str = "BadgeOverlay";

/// Lower-left corner and size of a page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub width: f32,
    pub height: f32,
}

/// Parse template bytes.
pub fn load(bytes: &[u8], name: &str) -> Result<Document, BadgeError> {
    if !bytes.starts_with(b"%PDF") {
        let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(BadgeError::template(name, format!("not a PDF (first bytes {magic:?})")));
    }
    Document::load_mem(bytes).map_err(|e| BadgeError::template(name, e))
}

/// Object id of page 1.
pub fn first_page(doc: &Document, name: &str) -> Result<ObjectId, BadgeError> {
    doc.get_pages()
        .get(&1)
        .copied()
        .ok_or_else(|| BadgeError::template(name, "document has no pages"))
}

/// MediaBox of `page_id`, following `/Parent` when the page inherits it.
pub fn page_box(doc: &Document, page_id: ObjectId, name: &str) -> Result<PageBox, BadgeError> {
    let media_box = inherited(doc, page_id, b"MediaBox")
        .map_err(|e| BadgeError::template(name, e))?
        .ok_or_else(|| BadgeError::template(name, "first page has no MediaBox"))?;
    let media_box = resolve(doc, media_box);
    let values: Vec<f32> = media_box
        .as_array()
        .map_err(|e| BadgeError::template(name, format!("MediaBox is not an array: {e}")))?
        .iter()
        .filter_map(|o| number(&resolve(doc, o.clone())))
        .collect();
    if values.len() != 4 {
        return Err(BadgeError::template(name, format!("malformed MediaBox {values:?}")));
    }
    let (x0, x1) = (values[0].min(values[2]), values[0].max(values[2]));
    let (y0, y1) = (values[1].min(values[3]), values[1].max(values[3]));
    if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
        return Err(BadgeError::template(name, format!("empty MediaBox {values:?}")));
    }
    Ok(PageBox {
        x0,
        y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn resolve(doc: &Document, obj: Object) -> Object {
    match obj {
        Object::Reference(id) => doc.get_object(id).cloned().unwrap_or(Object::Null),
        other => other,
    }
}

/// Page attribute, inherited through the page tree when absent.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Result<Option<Object>, lopdf::Error> {
    let mut current = page_id;
    for _ in 0..64 {
        let dict = doc.get_dictionary(current)?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value.clone()));
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return Ok(None),
        }
    }
    Ok(None)
}

// ── Overlay ──────────────────────────────────────────────────────────────

/// Content and resources of the stamped layer, in page-relative points.
#[derive(Debug, Default)]
pub struct Overlay {
    ops: Vec<Operation>,
    xobjects: Dictionary,
    fonts: Dictionary,
    images: usize,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operator: &str, operands: Vec<Object>) {
        self.ops.push(Operation::new(operator, operands));
    }

    /// Register an image XObject; returns its resource name.
    pub fn add_image(&mut self, id: ObjectId) -> String {
        self.images += 1;
        let name = format!("BadgeIm{}", self.images);
        self.xobjects.set(name.clone(), id);
        name
    }

    pub fn add_font(&mut self, name: &str, id: ObjectId) {
        self.fonts.set(name, id);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Turn the overlay into a page-sized Form XObject inside `doc`.
    pub fn into_form(self, doc: &mut Document, page: &PageBox) -> Result<ObjectId, BadgeError> {
        let content = Content { operations: self.ops }
            .encode()
            .map_err(|e| BadgeError::Render(format!("overlay content encoding: {e}")))?;
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
            "Resources" => dictionary! {
                "Font" => self.fonts,
                "XObject" => self.xobjects,
            },
        };
        Ok(doc.add_object(Stream::new(dict, content)))
    }
}

/// Add an opaque RGB image XObject.
pub fn add_rgb_image(doc: &mut Document, img: &RgbImage) -> ObjectId {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width() as i64,
        "Height" => img.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    doc.add_object(Stream::new(dict, img.as_raw().clone()))
}

/// Add an RGBA image XObject; alpha goes into a DeviceGray `SMask` when any
/// pixel is not fully opaque.
pub fn add_rgba_image(doc: &mut Document, img: &RgbaImage) -> ObjectId {
    let mut rgb = Vec::with_capacity((img.width() * img.height() * 3) as usize);
    let mut alpha = Vec::with_capacity((img.width() * img.height()) as usize);
    for p in img.pixels() {
        rgb.extend_from_slice(&p.0[..3]);
        alpha.push(p.0[3]);
    }
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width() as i64,
        "Height" => img.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if alpha.iter().any(|&a| a != 255) {
        let smask = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => img.width() as i64,
                "Height" => img.height() as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        dict.set("SMask", smask);
    }
    doc.add_object(Stream::new(dict, rgb))
}

// ── Stamping ─────────────────────────────────────────────────────────────

enum ResourcesAt {
    Indirect(ObjectId),
    Inline,
}

/// Draw `form_id` over page `page_id`, aligned with the page's lower-left.
///
/// Returns the resource name the overlay was registered under.
pub fn stamp(
    doc: &mut Document,
    page_id: ObjectId,
    form_id: ObjectId,
    page: &PageBox,
    name: &str,
) -> Result<String, BadgeError> {
    let err = |e: lopdf::Error| BadgeError::template(name, e);

    let at = page_resources(doc, page_id).map_err(err)?;
    let xobject_ref = match resources(doc, page_id, &at).map_err(err)?.get(b"XObject") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };

    let resource_name = {
        let xobjects: &mut Dictionary = match xobject_ref {
            Some(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut).map_err(err)?,
            None => {
                let res = resources(doc, page_id, &at).map_err(err)?;
                if !matches!(res.get(b"XObject"), Ok(Object::Dictionary(_))) {
                    res.set("XObject", Dictionary::new());
                }
                res.get_mut(b"XObject").and_then(Object::as_dict_mut).map_err(err)?
            }
        };
        let mut candidate = OVERLAY_NAME.to_string();
        let mut n = 1;
        while xobjects.has(candidate.as_bytes()) {
            candidate = format!("{OVERLAY_NAME}{n}");
            n += 1;
        }
        xobjects.set(candidate.clone(), form_id);
        candidate
    };

    let existing = page_contents(doc, page_id);
    let draw = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), page.x0.into(), page.y0.into()],
            ),
            Operation::new("Do", vec![Object::Name(resource_name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ],
    }
    .encode()
    .map_err(err)?;
    let draw_id = doc.add_object(Stream::new(dictionary! {}, draw));

    let contents = if existing.is_empty() {
        vec![Object::Reference(draw_id)]
    } else {
        let open = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let close = doc.add_object(Stream::new(dictionary! {}, b"Q\n".to_vec()));
        let mut all = Vec::with_capacity(existing.len() + 3);
        all.push(Object::Reference(open));
        all.extend(existing);
        all.push(Object::Reference(close));
        all.push(Object::Reference(draw_id));
        all
    };
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(err)?
        .set("Contents", contents);

    debug!("Stamped overlay /{resource_name} on page {:?}", page_id);
    Ok(resource_name)
}

/// Serialise with every stream Flate-compressed.
pub fn save(mut doc: Document, name: &str) -> Result<Vec<u8>, BadgeError> {
    doc.compress();
    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| BadgeError::template(name, format!("save failed: {e}")))?;
    Ok(buf)
}

/// Make sure the page has its own (or an indirect) resource dictionary,
/// copying an inherited one onto the page when needed.
fn page_resources(doc: &mut Document, page_id: ObjectId) -> Result<ResourcesAt, lopdf::Error> {
    match doc.get_dictionary(page_id)?.get(b"Resources") {
        Ok(Object::Reference(id)) => return Ok(ResourcesAt::Indirect(*id)),
        Ok(Object::Dictionary(_)) => return Ok(ResourcesAt::Inline),
        _ => {}
    }
    let copied = match inherited(doc, page_id, b"Resources")? {
        Some(Object::Reference(id)) => doc.get_dictionary(id)?.clone(),
        Some(Object::Dictionary(d)) => d,
        _ => Dictionary::new(),
    };
    doc.get_object_mut(page_id)?.as_dict_mut()?.set("Resources", copied);
    Ok(ResourcesAt::Inline)
}

fn resources<'a>(
    doc: &'a mut Document,
    page_id: ObjectId,
    at: &ResourcesAt,
) -> Result<&'a mut Dictionary, lopdf::Error> {
    match at {
        ResourcesAt::Indirect(id) => doc.get_object_mut(*id)?.as_dict_mut(),
        ResourcesAt::Inline => doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .get_mut(b"Resources")?
            .as_dict_mut(),
    }
}

/// Current content stream references of a page, flattened.
fn page_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Array(arr)) => arr.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            Ok(_) => vec![Object::Reference(*id)],
            Err(_) => Vec::new(),
        },
        _ => Vec::new(),
    }
}
