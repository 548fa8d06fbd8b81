//! Styled QR rendering.
//!
//! ```text
//! data ──encode (level H)──▶ QrMatrix ──layout(cell)──▶ shapes ─┬─▶ raster (RGB, PNG + DPI)
//!                                                               ├─▶ SVG
//!                                                               └─▶ PDF paths (compose::source)
//! ```
//!
//! Every backend draws the same [`geometry::QrLayout`], so raster and vector
//! output of one (data, style) pair always agree. Rendering is pure: no
//! caching, no clock, no randomness.

pub mod geometry;
pub mod matrix;
pub mod raster;
pub mod svg;

use crate::config::{Logo, LogoSource, StyleConfig};
use crate::error::BadgeError;
use geometry::QrLayout;
use image::{RgbImage, RgbaImage};
use matrix::QrMatrix;
use std::path::Path;
use tracing::debug;

pub use svg::SVG_CELL;

/// Matrix plus decoded logo, ready for any backend.
#[derive(Debug, Clone)]
pub struct PreparedQr {
    pub matrix: QrMatrix,
    /// Decoded logo pixels and their scale.
    pub logo: Option<(RgbaImage, f64)>,
}

impl PreparedQr {
    /// Encode `data` and decode the style's logo.
    ///
    /// A logo that cannot be read is an error, never silently dropped.
    pub fn new(data: &str, style: &StyleConfig) -> Result<Self, BadgeError> {
        let matrix = QrMatrix::encode(data)?;
        let logo = match style.logo {
            Some(ref logo) => Some((load_logo(logo)?, logo.scale)),
            None => None,
        };
        Ok(Self { matrix, logo })
    }

    pub fn layout(&self, style: &StyleConfig, cell: f64) -> QrLayout {
        QrLayout::new(&self.matrix, style, cell)
    }

    fn logo_ref(&self) -> Option<(&RgbaImage, f64)> {
        self.logo.as_ref().map(|(img, scale)| (img, *scale))
    }

    pub fn raster(&self, style: &StyleConfig) -> RgbImage {
        raster::paint(&self.layout(style, style.cell_px as f64), self.logo_ref())
    }

    pub fn svg(&self, style: &StyleConfig) -> Result<String, BadgeError> {
        svg::write_svg(&self.layout(style, SVG_CELL), self.logo_ref())
    }
}

/// Raster and vector renditions of one QR.
#[derive(Debug, Clone)]
pub struct RenderedQr {
    pub image: RgbImage,
    pub svg: String,
    /// Side length in modules, quiet zone excluded.
    pub modules: usize,
    pub dpi: u32,
}

impl RenderedQr {
    /// PNG bytes with the style's DPI.
    pub fn to_png(&self) -> Result<Vec<u8>, BadgeError> {
        raster::encode_png(&self.image, self.dpi)
    }

    /// Write `<stem>.png` and `<stem>.svg`, returning both paths.
    pub fn save(&self, stem: impl AsRef<Path>) -> Result<(std::path::PathBuf, std::path::PathBuf), BadgeError> {
        let stem = stem.as_ref();
        let png_path = stem.with_extension("png");
        let svg_path = stem.with_extension("svg");
        if let Some(parent) = stem.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BadgeError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&png_path, self.to_png()?).map_err(|e| BadgeError::OutputWriteFailed {
            path: png_path.clone(),
            source: e,
        })?;
        std::fs::write(&svg_path, &self.svg).map_err(|e| BadgeError::OutputWriteFailed {
            path: svg_path.clone(),
            source: e,
        })?;
        Ok((png_path, svg_path))
    }
}

/// Render `data` in both raster and vector form.
///
/// # Errors
/// * [`BadgeError::Encoding`]: payload too long for level H.
/// * [`BadgeError::Asset`]: the style names a logo that cannot be decoded.
pub fn render(data: &str, style: &StyleConfig) -> Result<RenderedQr, BadgeError> {
    let prepared = PreparedQr::new(data, style)?;
    let image = prepared.raster(style);
    let svg = prepared.svg(style)?;
    debug!(
        "Rendered {}-module QR as {}px raster and {}-byte SVG",
        prepared.matrix.width(),
        image.width(),
        svg.len()
    );
    Ok(RenderedQr {
        image,
        svg,
        modules: prepared.matrix.width(),
        dpi: style.dpi,
    })
}

/// Render straight to PNG bytes.
pub fn render_png(data: &str, style: &StyleConfig) -> Result<Vec<u8>, BadgeError> {
    let prepared = PreparedQr::new(data, style)?;
    raster::encode_png(&prepared.raster(style), style.dpi)
}

pub(crate) fn load_logo(logo: &Logo) -> Result<RgbaImage, BadgeError> {
    let asset_err = |detail: String| BadgeError::Asset {
        source_name: logo.source.describe(),
        detail,
    };
    let decoded = match logo.source {
        LogoSource::Path(ref path) => {
            let bytes = std::fs::read(path).map_err(|e| asset_err(e.to_string()))?;
            image::load_from_memory(&bytes)
        }
        LogoSource::Bytes(ref bytes) => image::load_from_memory(bytes),
    };
    decoded
        .map(|img| img.to_rgba8())
        .map_err(|e| asset_err(e.to_string()))
}
