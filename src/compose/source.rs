//! QR sources: how the styled QR gets into the overlay.
//!
//! One compositor, two ways to draw the code:
//!
//! * [`RasterQrSource`] embeds the same RGB raster a PNG export would
//!   contain as an image XObject. Identical pixels everywhere the QR is used.
//! * [`VectorQrSource`] re-derives the shape list in PDF units and emits path
//!   operators, so the code stays sharp at any print resolution. A logo is
//!   still an image (with an alpha `SMask`).

use crate::compose::pdf::{self, Overlay};
use crate::config::{Rgb, StyleConfig};
use crate::error::BadgeError;
use crate::model::PlacementRect;
use crate::qr::geometry::RoundedRect;
use crate::qr::PreparedQr;
use lopdf::{Document, Object};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Bézier control distance for a quarter circle of radius 1.
const KAPPA: f64 = 0.552_284_75;

/// Draws a QR for `data` into the overlay at `rect`.
pub trait QrSource: Send + Sync {
    fn draw(
        &self,
        doc: &mut Document,
        overlay: &mut Overlay,
        data: &str,
        rect: &PlacementRect,
    ) -> Result<(), BadgeError>;
}

/// Which [`QrSource`] a batch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrSourceKind {
    #[default]
    Raster,
    Vector,
}

impl QrSourceKind {
    pub fn source(self, style: StyleConfig) -> Arc<dyn QrSource> {
        match self {
            QrSourceKind::Raster => Arc::new(RasterQrSource::new(style)),
            QrSourceKind::Vector => Arc::new(VectorQrSource::new(style)),
        }
    }
}

impl fmt::Display for QrSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QrSourceKind::Raster => write!(f, "raster"),
            QrSourceKind::Vector => write!(f, "vector"),
        }
    }
}

impl FromStr for QrSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raster" | "png" => Ok(QrSourceKind::Raster),
            "vector" | "svg" => Ok(QrSourceKind::Vector),
            other => Err(format!("unknown QR source '{other}' (expected raster or vector)")),
        }
    }
}

fn prepare(data: &str, style: &StyleConfig) -> Result<PreparedQr, BadgeError> {
    PreparedQr::new(data, style).map_err(|e| BadgeError::Render(format!("QR for '{data}': {e}")))
}

/// Embeds the raster rendition.
#[derive(Debug, Clone)]
pub struct RasterQrSource {
    style: StyleConfig,
}

impl RasterQrSource {
    pub fn new(style: StyleConfig) -> Self {
        Self { style }
    }
}

impl QrSource for RasterQrSource {
    fn draw(
        &self,
        doc: &mut Document,
        overlay: &mut Overlay,
        data: &str,
        rect: &PlacementRect,
    ) -> Result<(), BadgeError> {
        let image = prepare(data, &self.style)?.raster(&self.style);
        let id = pdf::add_rgb_image(doc, &image);
        let name = overlay.add_image(id);
        overlay.push("q", vec![]);
        overlay.push(
            "cm",
            vec![
                rect.size.into(),
                0.into(),
                0.into(),
                rect.size.into(),
                rect.x.into(),
                rect.y.into(),
            ],
        );
        overlay.push("Do", vec![Object::Name(name.into_bytes())]);
        overlay.push("Q", vec![]);
        Ok(())
    }
}

/// Emits the QR as filled paths.
#[derive(Debug, Clone)]
pub struct VectorQrSource {
    style: StyleConfig,
}

impl VectorQrSource {
    pub fn new(style: StyleConfig) -> Self {
        Self { style }
    }
}

impl QrSource for VectorQrSource {
    fn draw(
        &self,
        doc: &mut Document,
        overlay: &mut Overlay,
        data: &str,
        rect: &PlacementRect,
    ) -> Result<(), BadgeError> {
        let prepared = prepare(data, &self.style)?;
        // Unit cells; the cm below maps layout space (y down) onto the rect.
        let layout = prepared.layout(&self.style, 1.0);
        let scale = rect.size as f64 / layout.side;

        overlay.push("q", vec![]);
        overlay.push(
            "cm",
            vec![
                num(scale),
                0.into(),
                0.into(),
                num(-scale),
                rect.x.into(),
                rect.top().into(),
            ],
        );

        set_fill(overlay, layout.background);
        overlay.push("re", vec![0.into(), 0.into(), num(layout.side), num(layout.side)]);
        overlay.push("f", vec![]);

        let mut current: Option<Rgb> = None;
        for shape in &layout.shapes {
            if current != Some(shape.color) {
                if current.is_some() {
                    overlay.push("f", vec![]);
                }
                set_fill(overlay, shape.color);
                current = Some(shape.color);
            }
            rounded_rect_path(overlay, shape);
        }
        if current.is_some() {
            overlay.push("f", vec![]);
        }

        if let Some((ref logo, logo_scale)) = prepared.logo {
            if let Some(frame) = layout.logo_frame(logo_scale, logo.width(), logo.height()) {
                set_fill(overlay, frame.pad.color);
                rounded_rect_path(overlay, &frame.pad);
                overlay.push("f", vec![]);

                let id = pdf::add_rgba_image(doc, logo);
                let name = overlay.add_image(id);
                // Flip back so the image is upright inside the y-down space.
                overlay.push("q", vec![]);
                overlay.push(
                    "cm",
                    vec![
                        num(frame.width),
                        0.into(),
                        0.into(),
                        num(-frame.height),
                        num(frame.x),
                        num(frame.y + frame.height),
                    ],
                );
                overlay.push("Do", vec![Object::Name(name.into_bytes())]);
                overlay.push("Q", vec![]);
            }
        }

        overlay.push("Q", vec![]);
        Ok(())
    }
}

fn num(v: f64) -> Object {
    (v as f32).into()
}

fn set_fill(overlay: &mut Overlay, color: Rgb) {
    let [r, g, b] = color.to_unit();
    overlay.push("rg", vec![r.into(), g.into(), b.into()]);
}

/// Append a closed rounded-rectangle subpath.
fn rounded_rect_path(overlay: &mut Overlay, s: &RoundedRect) {
    let (x, y, w, h) = (s.x, s.y, s.width, s.height);
    let r = s.radius.min(w / 2.0).min(h / 2.0);
    if r <= 0.0 {
        overlay.push("re", vec![num(x), num(y), num(w), num(h)]);
        return;
    }
    let k = KAPPA * r;
    let (right, bottom) = (x + w, y + h);
    overlay.push("m", vec![num(x + r), num(y)]);
    overlay.push("l", vec![num(right - r), num(y)]);
    overlay.push(
        "c",
        vec![num(right - r + k), num(y), num(right), num(y + r - k), num(right), num(y + r)],
    );
    overlay.push("l", vec![num(right), num(bottom - r)]);
    overlay.push(
        "c",
        vec![num(right), num(bottom - r + k), num(right - r + k), num(bottom), num(right - r), num(bottom)],
    );
    overlay.push("l", vec![num(x + r), num(bottom)]);
    overlay.push(
        "c",
        vec![num(x + r - k), num(bottom), num(x), num(bottom - r + k), num(x), num(bottom - r)],
    );
    overlay.push("l", vec![num(x), num(y + r)]);
    overlay.push("c", vec![num(x), num(y + r - k), num(x + r - k), num(y), num(x + r), num(y)]);
    overlay.push("h", vec![]);
}
