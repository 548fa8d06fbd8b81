//! Badge composition: stamp a styled QR and fitted name/company text onto a
//! PDF template.
//!
//! ```text
//! template bytes ──load──▶ page 1 box ─┐
//!                                      ├─▶ overlay (Form XObject, page-sized)
//! QrSource.draw(data, placement) ──────┤      │
//! text::layout_lines(name, company) ───┘      ▼
//!                                   stamp on a fresh copy ──▶ PDF bytes
//! ```
//!
//! The template is parsed anew for every badge, so one badge can never see
//! another's overlay, and the template file itself is only ever read.

pub mod fonts;
pub mod pdf;
pub mod source;
pub mod text;

pub use source::{QrSource, QrSourceKind, RasterQrSource, VectorQrSource};

use crate::config::{StyleConfig, TextConfig};
use crate::error::BadgeError;
use crate::model::{AttendeeRecord, BadgeText, PlacementRect};
use fonts::BadgeFont;
use pdf::Overlay;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything that varies per badge.
#[derive(Debug, Clone)]
pub struct BadgeRequest<'a> {
    /// QR payload, normally the attendee id.
    pub qr_data: &'a str,
    pub text: &'a BadgeText,
    pub placement: PlacementRect,
}

/// Compose one badge in memory.
///
/// `template_name` only labels errors and logs.
///
/// # Errors
/// * [`BadgeError::Template`]: the template is not a usable PDF.
/// * [`BadgeError::Render`]: the QR could not be produced.
/// * [`BadgeError::InvalidConfig`]: the placement or text layout is degenerate.
/// * [`BadgeError::Asset`]: the configured font cannot be loaded.
/// * [`BadgeError::MissingGlyphs`]: the font cannot show the attendee's text.
pub fn compose_badge(
    template: &[u8],
    template_name: &str,
    request: &BadgeRequest<'_>,
    source: &dyn QrSource,
    text_cfg: &TextConfig,
) -> Result<Vec<u8>, BadgeError> {
    if !request.placement.is_valid() {
        return Err(BadgeError::InvalidConfig(format!(
            "placement {:?} must have a positive, finite size",
            request.placement
        )));
    }
    text_cfg.validate()?;

    let mut doc = pdf::load(template, template_name)?;
    let page_id = pdf::first_page(&doc, template_name)?;
    let page = pdf::page_box(&doc, page_id, template_name)?;

    let mut overlay = Overlay::new();
    source.draw(&mut doc, &mut overlay, request.qr_data, &request.placement)?;

    let font = BadgeFont::for_config(text_cfg)?;
    let lines = text::layout_lines(&font, request.text, page.width, &request.placement, text_cfg);
    let shown = lines
        .iter()
        .map(|line| font.encode(&line.text))
        .collect::<Result<Vec<_>, _>>()?;
    if !lines.is_empty() {
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        let font_id = font.add_to(&mut doc, &texts);
        overlay.add_font(pdf::FONT_NAME, font_id);
    }
    for (line, string) in lines.iter().zip(shown) {
        let [r, g, b] = line.color.to_unit();
        overlay.push("BT", vec![]);
        overlay.push("Tf", vec![pdf::FONT_NAME.into(), line.size.into()]);
        overlay.push("rg", vec![r.into(), g.into(), b.into()]);
        overlay.push("Td", vec![line.x.into(), line.baseline.into()]);
        overlay.push("Tj", vec![string]);
        overlay.push("ET", vec![]);
    }

    let form = overlay.into_form(&mut doc, &page)?;
    pdf::stamp(&mut doc, page_id, form, &page, template_name)?;
    let bytes = pdf::save(doc, template_name)?;
    debug!(
        "Composed badge for '{}' on '{}' ({} text lines, {} bytes)",
        request.qr_data,
        template_name,
        lines.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Compose one badge from a template file and write it atomically.
///
/// The output appears under its final name only once fully written, so a
/// crashed run never leaves a truncated badge that incremental mode would
/// take for a finished one.
pub fn compose_to_file(
    template_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    request: &BadgeRequest<'_>,
    source: &dyn QrSource,
    text_cfg: &TextConfig,
) -> Result<PathBuf, BadgeError> {
    let template_path = template_path.as_ref();
    let output_path = output_path.as_ref();
    let template = read_file(template_path)?;
    let name = template_path.display().to_string();
    let bytes = compose_badge(&template, &name, request, source, text_cfg)?;
    write_atomic(output_path, &bytes)?;
    Ok(output_path.to_path_buf())
}

/// Sample attendee used by [`preview`].
pub fn sample_record() -> AttendeeRecord {
    AttendeeRecord::new("99000000001", "María", "García Fernández", "").with_company("Contoso Ltd.")
}

/// Compose a badge for [`sample_record`] so a template/placement pair can be
/// checked before a batch run.
pub fn preview(
    template_path: impl AsRef<Path>,
    placement: PlacementRect,
    style: &StyleConfig,
    kind: QrSourceKind,
    text_cfg: &TextConfig,
) -> Result<Vec<u8>, BadgeError> {
    let template_path = template_path.as_ref();
    let template = read_file(template_path)?;
    let record = sample_record();
    let badge_text = record.badge_text();
    let request = BadgeRequest {
        qr_data: &record.id,
        text: &badge_text,
        placement,
    };
    let source = kind.source(style.clone());
    compose_badge(
        &template,
        &template_path.display().to_string(),
        &request,
        source.as_ref(),
        text_cfg,
    )
}

/// What a template looks like to the compositor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateInfo {
    pub path: PathBuf,
    pub pdf_version: String,
    pub page_count: usize,
    /// First-page size in points.
    pub width: f32,
    pub height: f32,
}

/// Report page count and first-page size without composing anything.
pub fn inspect_template(path: impl AsRef<Path>) -> Result<TemplateInfo, BadgeError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let bytes = read_file(path)?;
    let doc = pdf::load(&bytes, &name)?;
    let page_id = pdf::first_page(&doc, &name)?;
    let page = pdf::page_box(&doc, page_id, &name)?;
    Ok(TemplateInfo {
        path: path.to_path_buf(),
        pdf_version: doc.version.clone(),
        page_count: doc.get_pages().len(),
        width: page.width,
        height: page.height,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, BadgeError> {
    std::fs::read(path).map_err(|e| BadgeError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write via a temp file in the target directory, then rename into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BadgeError> {
    let write_err = |e: std::io::Error| BadgeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".badge-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::fonts::encode_win_ansi;
    use crate::compose::fonts::tests::system_font;
    use crate::compose::pdf::tests::template_bytes;
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object};

    /// Decoded operations of the stamped overlay form.
    fn overlay_ops(bytes: &[u8]) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).unwrap();
        let page = *doc.get_pages().get(&1).unwrap();
        let resources = match doc.get_dictionary(page).unwrap().get(b"Resources").unwrap() {
            Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
            Object::Dictionary(d) => d,
            other => panic!("unexpected resources {other:?}"),
        };
        let xobjects = resources.get(b"XObject").and_then(Object::as_dict).unwrap();
        let form_id = xobjects.get(b"BadgeOverlay").and_then(Object::as_reference).unwrap();
        let stream = doc.get_object(form_id).and_then(Object::as_stream).unwrap();
        let raw = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        Content::decode(&raw).unwrap().operations
    }

    fn shown_strings(ops: &[Operation]) -> Vec<Vec<u8>> {
        ops.iter()
            .filter(|o| o.operator == "Tj")
            .filter_map(|o| o.operands.first().and_then(|s| s.as_str().ok()).map(<[u8]>::to_vec))
            .collect()
    }

    fn font_sizes(ops: &[Operation]) -> Vec<f32> {
        ops.iter()
            .filter(|o| o.operator == "Tf")
            .filter_map(|o| o.operands.get(1).and_then(|s| s.as_float().ok()))
            .collect()
    }

    fn badge(source: &dyn QrSource, text: &BadgeText) -> Vec<u8> {
        let request = BadgeRequest {
            qr_data: "A-0001",
            text,
            placement: PlacementRect::new(90.0, 80.0, 120.0),
        };
        compose_badge(&template_bytes(300, 420), "template.pdf", &request, source, &TextConfig::default()).unwrap()
    }

    #[test]
    fn overlay_carries_text_and_qr_image() {
        let text = AttendeeRecord::new("A-0001", "Ana", "Pérez", "")
            .with_company("Contoso")
            .badge_text();
        let ops = overlay_ops(&badge(&RasterQrSource::new(StyleConfig::badge_default()), &text));

        assert_eq!(ops.iter().filter(|o| o.operator == "Do").count(), 1);
        assert_eq!(
            shown_strings(&ops),
            vec![encode_win_ansi("PÉREZ").unwrap(), b"ANA".to_vec(), b"CONTOSO".to_vec()]
        );
        assert_eq!(font_sizes(&ops), vec![22.0, 22.0, 18.0]);
    }

    #[test]
    fn null_like_company_is_not_drawn() {
        let text = AttendeeRecord::new("A-0001", "Ana", "Pérez", "")
            .with_company("nan")
            .badge_text();
        let ops = overlay_ops(&badge(&RasterQrSource::new(StyleConfig::badge_default()), &text));
        assert_eq!(shown_strings(&ops).len(), 2);
        assert!(!font_sizes(&ops).contains(&18.0));
    }

    #[test]
    fn vector_badge_embeds_no_qr_image() {
        let ops = overlay_ops(&badge(&VectorQrSource::new(StyleConfig::badge_default()), &BadgeText::default()));
        assert!(ops.iter().all(|o| o.operator != "Do"));
        assert!(ops.iter().any(|o| o.operator == "c"));
        assert!(ops.iter().all(|o| o.operator != "BT"));
    }

    #[test]
    fn output_keeps_template_page_size_and_content() {
        let bytes = badge(&RasterQrSource::new(StyleConfig::badge_default()), &BadgeText::default());
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let page = *doc.get_pages().get(&1).unwrap();
        let b = pdf::page_box(&doc, page, "out").unwrap();
        assert_eq!((b.width, b.height), (300.0, 420.0));
        let content = doc.get_page_content(page).unwrap();
        assert!(String::from_utf8_lossy(&content).contains("EVENT 2026"));
    }

    #[test]
    fn degenerate_placement_is_rejected() {
        let text = BadgeText::default();
        let request = BadgeRequest {
            qr_data: "x",
            text: &text,
            placement: PlacementRect::new(0.0, 0.0, -5.0),
        };
        let err = compose_badge(
            &template_bytes(300, 420),
            "t",
            &request,
            &RasterQrSource::new(StyleConfig::badge_default()),
            &TextConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BadgeError::InvalidConfig(_)));
    }

    #[test]
    fn compose_to_file_leaves_template_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("attendee.pdf");
        std::fs::write(&template, template_bytes(300, 420)).unwrap();
        let before = std::fs::read(&template).unwrap();
        let text = BadgeText::default();
        let request = BadgeRequest {
            qr_data: "42",
            text: &text,
            placement: PlacementRect::new(90.0, 80.0, 120.0),
        };
        let out = dir.path().join("out/attendee-42.pdf");
        compose_to_file(
            &template,
            &out,
            &request,
            &RasterQrSource::new(StyleConfig::badge_default()),
            &TextConfig::default(),
        )
        .unwrap();
        assert!(std::fs::read(&out).unwrap().starts_with(b"%PDF"));
        assert_eq!(std::fs::read(&template).unwrap(), before);
        let leftovers = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn preview_and_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("speaker.pdf");
        std::fs::write(&template, template_bytes(298, 420)).unwrap();

        let info = inspect_template(&template).unwrap();
        assert_eq!(info.page_count, 1);
        assert_eq!((info.width, info.height), (298.0, 420.0));

        let bytes = preview(
            &template,
            PlacementRect::new(89.0, 60.0, 120.0),
            &StyleConfig::badge_default(),
            QrSourceKind::Vector,
            &TextConfig::default(),
        )
        .unwrap();
        let shown = shown_strings(&overlay_ops(&bytes));
        assert_eq!(shown[0], encode_win_ansi("GARCÍA FERNÁNDEZ").unwrap());
        assert_eq!(shown[1], encode_win_ansi("MARÍA").unwrap());
        assert_eq!(shown[2], encode_win_ansi("CONTOSO LTD.").unwrap());
    }

    #[test]
    fn names_outside_win_ansi_fail_with_the_standard_font() {
        let text = AttendeeRecord::new("PL-1", "Łukasz", "Dvořák", "").badge_text();
        let request = BadgeRequest {
            qr_data: "PL-1",
            text: &text,
            placement: PlacementRect::new(90.0, 80.0, 120.0),
        };
        let err = compose_badge(
            &template_bytes(300, 420),
            "template.pdf",
            &request,
            &RasterQrSource::new(StyleConfig::badge_default()),
            &TextConfig::default(),
        )
        .unwrap_err();
        match err {
            BadgeError::MissingGlyphs { chars, text, .. } => {
                assert_eq!(text, "DVOŘÁK");
                assert_eq!(chars, "Ř");
            }
            other => panic!("expected MissingGlyphs, got {other:?}"),
        }
    }

    #[test]
    fn embedded_font_prints_latin_extended_names() {
        let Some(font) = system_font() else {
            eprintln!("no DejaVuSans-Bold.ttf found, skipping");
            return;
        };
        let text = AttendeeRecord::new("PL-1", "Łukasz", "Dvořák", "").badge_text();
        let request = BadgeRequest {
            qr_data: "PL-1",
            text: &text,
            placement: PlacementRect::new(90.0, 80.0, 120.0),
        };
        let cfg = TextConfig {
            font: Some(font),
            ..TextConfig::default()
        };
        let bytes = compose_badge(
            &template_bytes(300, 420),
            "template.pdf",
            &request,
            &RasterQrSource::new(StyleConfig::badge_default()),
            &cfg,
        )
        .unwrap();

        let shown = shown_strings(&overlay_ops(&bytes));
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].len(), 2 * "DVOŘÁK".chars().count());

        let doc = Document::load_mem(&bytes).unwrap();
        let type0 = doc
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .find(|d| matches!(d.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Type0"))
            .expect("Type0 font");
        assert!(type0.has(b"ToUnicode"));
        assert!(matches!(type0.get(b"Encoding"), Ok(Object::Name(n)) if n == b"Identity-H"));
    }

    #[test]
    fn preview_rejects_degenerate_text_layout() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("attendee.pdf");
        std::fs::write(&template, template_bytes(298, 420)).unwrap();
        let text = TextConfig {
            step: 0.0,
            ..TextConfig::default()
        };
        let err = preview(
            &template,
            PlacementRect::new(89.0, 60.0, 120.0),
            &StyleConfig::badge_default(),
            QrSourceKind::Raster,
            &text,
        )
        .unwrap_err();
        assert!(matches!(err, BadgeError::InvalidConfig(_)));
    }

    #[test]
    fn missing_template_is_a_read_error() {
        let err = inspect_template("/nonexistent/template.pdf").unwrap_err();
        assert!(matches!(err, BadgeError::ReadFailed { .. }));
    }
}
