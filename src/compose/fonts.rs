//! Typefaces for the badge text.
//!
//! By default badges use the standard-14 `Helvetica-Bold` with
//! `WinAnsiEncoding`: no font file is embedded and every PDF viewer has the
//! glyphs, but only cp1252 characters can be shown. Widths come from the
//! Adobe AFM, in 1/1000 em.
//!
//! A TrueType file configured through [`TextConfig::font`] is embedded
//! instead as a `Type0` font (`Identity-H`, glyph ids as CIDs) with a
//! `ToUnicode` map, so any name the font has glyphs for is printed as-is.
//!
//! Text a font cannot show fails with [`BadgeError::MissingGlyphs`] rather
//! than being drawn as `?`.

use crate::config::TextConfig;
use crate::error::BadgeError;
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Advance widths, all that text layout needs from a font.
pub trait TextMetrics {
    /// Advance width of `text` at `size` points.
    fn text_width(&self, text: &str, size: f32) -> f32;
}

// ── Standard 14 ──────────────────────────────────────────────────────────

/// A standard-14 font with WinAnsi widths.
pub struct FontMetrics {
    pub base_font: &'static str,
    widths: [u16; 256],
}

impl FontMetrics {
    /// Advance width of `text` at `size` points. Unmappable characters
    /// count as `?`.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .map(|c| self.widths[win_ansi_byte(c).unwrap_or(b'?') as usize] as u32)
            .sum();
        units as f32 * size / 1000.0
    }
}

impl TextMetrics for FontMetrics {
    fn text_width(&self, text: &str, size: f32) -> f32 {
        FontMetrics::text_width(self, text, size)
    }
}

/// Process-wide Helvetica-Bold metrics.
pub static HELVETICA_BOLD: Lazy<FontMetrics> = Lazy::new(|| FontMetrics {
    base_font: "Helvetica-Bold",
    widths: helvetica_bold_widths(),
});

/// Encode to WinAnsi (cp1252).
///
/// # Errors
/// The characters that have no WinAnsi code, in order of appearance.
pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::with_capacity(text.len());
    let mut missing = String::new();
    for c in text.chars() {
        match win_ansi_byte(c) {
            Some(b) => bytes.push(b),
            None if !missing.contains(c) => missing.push(c),
            None => {}
        }
    }
    if missing.is_empty() {
        Ok(bytes)
    } else {
        Err(missing)
    }
}

fn win_ansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    if (0x20..=0x7E).contains(&code) || (0xA0..=0xFF).contains(&code) {
        return Some(code as u8);
    }
    let b = match c {
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        '\t' | '\n' | '\r' => b' ',
        _ => return None,
    };
    Some(b)
}

// ── Embedded TrueType ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Glyph {
    id: u16,
    /// Advance in 1/1000 em.
    width: u16,
}

/// A parsed TrueType font ready to be embedded whole.
pub struct TrueTypeFont {
    pub postscript_name: String,
    data: Arc<[u8]>,
    glyphs: HashMap<char, Glyph>,
    notdef_width: u16,
    /// 1/1000 em, PDF font-descriptor units.
    ascent: i32,
    descent: i32,
    cap_height: i32,
    bbox: [i32; 4],
}

impl std::fmt::Debug for TrueTypeFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrueTypeFont")
            .field("postscript_name", &self.postscript_name)
            .field("bytes", &self.data.len())
            .field("glyphs", &self.glyphs.len())
            .finish()
    }
}

static LOADED_FONTS: Lazy<Mutex<HashMap<PathBuf, Arc<TrueTypeFont>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

impl TrueTypeFont {
    /// Load and parse a font file once per process; later calls with the
    /// same path share the parsed font.
    ///
    /// # Errors
    /// [`BadgeError::Asset`] when the file cannot be read or is not a
    /// usable TrueType font.
    pub fn load(path: &Path) -> Result<Arc<Self>, BadgeError> {
        let mut cache = LOADED_FONTS.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(font) = cache.get(path) {
            return Ok(Arc::clone(font));
        }
        let name = path.display().to_string();
        let data = std::fs::read(path).map_err(|e| BadgeError::Asset {
            source_name: name.clone(),
            detail: format!("font: {e}"),
        })?;
        let font = Arc::new(Self::from_bytes(&name, data)?);
        debug!("Loaded font {} ({} glyphs) from {}", font.postscript_name, font.glyphs.len(), name);
        cache.insert(path.to_path_buf(), Arc::clone(&font));
        Ok(font)
    }

    /// Parse font bytes. `source_name` only labels errors.
    pub fn from_bytes(source_name: &str, data: Vec<u8>) -> Result<Self, BadgeError> {
        let asset_err = |detail: String| BadgeError::Asset {
            source_name: source_name.to_string(),
            detail,
        };
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| asset_err(format!("font: {e}")))?;
        let upem = face.units_per_em() as f32;
        if upem <= 0.0 {
            return Err(asset_err("font has no units per em".into()));
        }
        let scale = |v: i32| (v as f32 * 1000.0 / upem).round() as i32;
        let width_of = |gid: ttf_parser::GlyphId| {
            scale(face.glyph_hor_advance(gid).unwrap_or(0) as i32).clamp(0, u16::MAX as i32) as u16
        };

        let mut glyphs = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    let Some(c) = char::from_u32(cp) else { return };
                    if let Some(gid) = subtable.glyph_index(cp).filter(|g| g.0 != 0) {
                        glyphs.entry(c).or_insert_with(|| Glyph {
                            id: gid.0,
                            width: width_of(gid),
                        });
                    }
                });
            }
        }
        if glyphs.is_empty() {
            return Err(asset_err("font has no Unicode character map".into()));
        }

        let postscript_name = face
            .names()
            .into_iter()
            .find(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .and_then(|n| n.to_string())
            .map(|n| n.chars().filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c)).collect::<String>())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "BadgeFont".to_string());
        let b = face.global_bounding_box();
        let bbox = [
            scale(b.x_min as i32),
            scale(b.y_min as i32),
            scale(b.x_max as i32),
            scale(b.y_max as i32),
        ];
        let notdef_width = width_of(ttf_parser::GlyphId(0));
        let ascent = scale(face.ascender() as i32);
        let descent = scale(face.descender() as i32);
        let cap_height = scale(face.capital_height().unwrap_or(face.ascender()) as i32);
        Ok(Self {
            postscript_name,
            data: data.into(),
            glyphs,
            notdef_width,
            ascent,
            descent,
            cap_height,
            bbox,
        })
    }

    pub fn has_glyph(&self, c: char) -> bool {
        self.glyphs.contains_key(&c)
    }

    /// Two-byte glyph ids for `text`, or the characters the font lacks.
    fn glyph_ids(&self, text: &str) -> Result<Vec<u8>, String> {
        let mut bytes = Vec::with_capacity(text.len() * 2);
        let mut missing = String::new();
        for c in text.chars() {
            match self.glyphs.get(&c) {
                Some(g) => bytes.extend_from_slice(&g.id.to_be_bytes()),
                None if !missing.contains(c) => missing.push(c),
                None => {}
            }
        }
        if missing.is_empty() {
            Ok(bytes)
        } else {
            Err(missing)
        }
    }

    /// Add the font program and its dictionaries; `texts` decides which
    /// widths and Unicode mappings are written.
    fn embed(&self, doc: &mut Document, texts: &[&str]) -> ObjectId {
        let mut used: BTreeMap<u16, (char, u16)> = BTreeMap::new();
        for c in texts.iter().flat_map(|t| t.chars()) {
            if let Some(g) = self.glyphs.get(&c) {
                used.entry(g.id).or_insert((c, g.width));
            }
        }

        let name = Object::Name(self.postscript_name.clone().into_bytes());
        let program = doc.add_object(Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.to_vec(),
        ));
        let descriptor = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => name.clone(),
            "Flags" => 32,
            "FontBBox" => self.bbox.iter().map(|&v| Object::Integer(v as i64)).collect::<Vec<_>>(),
            "ItalicAngle" => 0,
            "Ascent" => self.ascent as i64,
            "Descent" => self.descent as i64,
            "CapHeight" => self.cap_height as i64,
            "StemV" => 120,
            "FontFile2" => program,
        });
        let widths: Vec<Object> = used
            .iter()
            .flat_map(|(&gid, &(_, w))| [Object::Integer(gid as i64), Object::Array(vec![Object::Integer(w as i64)])])
            .collect();
        let descendant = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => name.clone(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor,
            "DW" => self.notdef_width as i64,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });
        let to_unicode = doc.add_object(Stream::new(dictionary! {}, to_unicode_cmap(&used).into_bytes()));
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => name,
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(descendant)],
            "ToUnicode" => to_unicode,
        })
    }
}

impl TextMetrics for TrueTypeFont {
    fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .map(|c| self.glyphs.get(&c).map_or(self.notdef_width, |g| g.width) as u32)
            .sum();
        units as f32 * size / 1000.0
    }
}

fn to_unicode_cmap(used: &BTreeMap<u16, (char, u16)>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(u16, char)> = used.iter().map(|(&gid, &(c, _))| (gid, c)).collect();
    // At most 100 entries per bfchar block.
    for chunk in entries.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for &(gid, c) in chunk {
            let mut units = [0u16; 2];
            let hex: String = c.encode_utf16(&mut units).iter().map(|u| format!("{u:04X}")).collect();
            let _ = writeln!(cmap, "<{gid:04X}> <{hex}>");
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

// ── Font selection ───────────────────────────────────────────────────────

/// The font a badge's text is set in.
#[derive(Debug, Clone)]
pub enum BadgeFont {
    Standard(&'static FontMetrics),
    TrueType(Arc<TrueTypeFont>),
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.base_font)
    }
}

impl BadgeFont {
    /// The configured TrueType font, else Helvetica-Bold.
    pub fn for_config(cfg: &TextConfig) -> Result<Self, BadgeError> {
        match cfg.font {
            Some(ref path) => Ok(BadgeFont::TrueType(TrueTypeFont::load(path)?)),
            None => Ok(BadgeFont::Standard(&HELVETICA_BOLD)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BadgeFont::Standard(m) => m.base_font,
            BadgeFont::TrueType(t) => &t.postscript_name,
        }
    }

    /// `text` as a string operand for `Tj`.
    ///
    /// # Errors
    /// [`BadgeError::MissingGlyphs`] when the font cannot show every
    /// character.
    pub fn encode(&self, text: &str) -> Result<Object, BadgeError> {
        let encoded = match self {
            BadgeFont::Standard(_) => encode_win_ansi(text).map(|b| Object::String(b, StringFormat::Literal)),
            BadgeFont::TrueType(t) => t.glyph_ids(text).map(|b| Object::String(b, StringFormat::Hexadecimal)),
        };
        encoded.map_err(|chars| BadgeError::MissingGlyphs {
            font: self.name().to_string(),
            text: text.to_string(),
            chars,
        })
    }

    /// Add the font dictionary for `texts` to `doc`.
    pub fn add_to(&self, doc: &mut Document, texts: &[&str]) -> ObjectId {
        match self {
            BadgeFont::Standard(m) => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => m.base_font,
                "Encoding" => "WinAnsiEncoding",
            }),
            BadgeFont::TrueType(t) => t.embed(doc, texts),
        }
    }
}

impl TextMetrics for BadgeFont {
    fn text_width(&self, text: &str, size: f32) -> f32 {
        match self {
            BadgeFont::Standard(m) => m.text_width(text, size),
            BadgeFont::TrueType(t) => t.text_width(text, size),
        }
    }
}

#[rustfmt::skip]
const ASCII_WIDTHS: [u16; 95] = [
    // space ! " # $ % & ' ( ) * + , - . /
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0-9
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    // : ; < = > ? @
    333, 333, 584, 584, 584, 611, 975,
    // A-Z
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    // [ \ ] ^ _ `
    333, 278, 333, 584, 556, 333,
    // a-z
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    // { | } ~
    389, 280, 389, 584,
];

#[rustfmt::skip]
const HIGH_WIDTHS: [(u8, u16); 27] = [
    (0x80, 556), (0x82, 278), (0x83, 556), (0x84, 500), (0x85, 1000), (0x86, 556),
    (0x87, 556), (0x88, 333), (0x89, 1000), (0x8A, 667), (0x8B, 333), (0x8C, 1000),
    (0x8E, 611), (0x91, 278), (0x92, 278), (0x93, 500), (0x94, 500), (0x95, 350),
    (0x96, 556), (0x97, 1000), (0x98, 333), (0x99, 1000), (0x9A, 556), (0x9B, 333),
    (0x9C, 944), (0x9E, 500), (0x9F, 667),
];

#[rustfmt::skip]
const LATIN1_WIDTHS: [u16; 96] = [
    // A0-AF
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    // B0-BF
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    // C0-CF
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    // D0-DF
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    // E0-EF
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278,
    // F0-FF
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556,
];

fn helvetica_bold_widths() -> [u16; 256] {
    // `?` for anything unmapped, matching what encode_win_ansi emits.
    let mut widths = [611u16; 256];
    for (i, w) in ASCII_WIDTHS.iter().enumerate() {
        widths[0x20 + i] = *w;
    }
    for &(code, w) in HIGH_WIDTHS.iter() {
        widths[code as usize] = w;
    }
    for (i, w) in LATIN1_WIDTHS.iter().enumerate() {
        widths[0xA0 + i] = *w;
    }
    widths
}
