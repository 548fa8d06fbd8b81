//! Shape layout shared by every QR backend.
//!
//! The raster painter, the SVG writer and the PDF vector source all draw the
//! same list of rounded rectangles; they only differ in the cell unit they
//! pass to [`QrLayout::new`]. Coordinates are top-left origin, y down.

use crate::config::{Rgb, StyleConfig, LOGO_MAX_FRACTION};
use crate::qr::matrix::{QrMatrix, FINDER_SIZE};

/// Finder layer radii as fractions of the layer side, before roundness.
const FINDER_OUTER_RADIUS: f64 = 0.22;
const FINDER_INNER_RADIUS: f64 = 0.18;
const FINDER_DOT_RADIUS: f64 = 0.35;

/// Logo pad width and corner radius, in cells.
const LOGO_PAD_CELLS: f64 = 0.3;
const LOGO_PAD_RADIUS_CELLS: f64 = 0.4;

/// A filled rectangle with uniformly rounded corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub radius: f64,
    pub color: Rgb,
}

impl RoundedRect {
    fn square(x: f64, y: f64, side: f64, radius: f64, color: Rgb) -> Self {
        Self {
            x,
            y,
            width: side,
            height: side,
            radius: radius.clamp(0.0, side / 2.0),
            color,
        }
    }
}

/// Where the logo and its background pad go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogoFrame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub pad: RoundedRect,
}

/// Every shape of one styled QR at a given cell unit.
#[derive(Debug, Clone)]
pub struct QrLayout {
    pub cell: f64,
    pub modules: usize,
    /// Full image side including the quiet zone on both sides.
    pub side: f64,
    pub background: Rgb,
    /// Painted in order; later shapes cover earlier ones.
    pub shapes: Vec<RoundedRect>,
}

impl QrLayout {
    pub fn new(matrix: &QrMatrix, style: &StyleConfig, cell: f64) -> Self {
        let n = matrix.width();
        let quiet = style.quiet_zone as f64 * cell;
        let side = (n as f64 + 2.0 * style.quiet_zone as f64) * cell;
        let roundness = style.roundness.clamp(0.0, 1.0);

        let gap = cell * style.gap_ratio;
        let body = (cell - 2.0 * gap).max(0.0);
        let module_radius = roundness * body / 2.0;

        let mut shapes: Vec<RoundedRect> = matrix
            .data_modules()
            .map(|(r, c)| {
                RoundedRect::square(
                    quiet + c as f64 * cell + gap,
                    quiet + r as f64 * cell + gap,
                    body,
                    module_radius,
                    style.foreground,
                )
            })
            .collect();

        let eye = style.eye_color();
        for (r0, c0) in matrix.finder_origins() {
            let x = quiet + c0 as f64 * cell;
            let y = quiet + r0 as f64 * cell;
            let layers = [
                (0.0, FINDER_SIZE as f64, FINDER_OUTER_RADIUS, eye),
                (1.0, FINDER_SIZE as f64 - 2.0, FINDER_INNER_RADIUS, style.background),
                (2.0, FINDER_SIZE as f64 - 4.0, FINDER_DOT_RADIUS, eye),
            ];
            for (inset, cells, radius, color) in layers {
                let s = cells * cell;
                shapes.push(RoundedRect::square(
                    x + inset * cell,
                    y + inset * cell,
                    s,
                    s * roundness * radius,
                    color,
                ));
            }
        }

        Self {
            cell,
            modules: n,
            side,
            background: style.background,
            shapes,
        }
    }

    /// Centred logo frame for a `logo_w × logo_h` image, aspect preserved.
    ///
    /// The logo side is `modules · scale · cell`, capped at
    /// [`LOGO_MAX_FRACTION`] of the image side.
    pub fn logo_frame(&self, scale: f64, logo_w: u32, logo_h: u32) -> Option<LogoFrame> {
        if logo_w == 0 || logo_h == 0 || scale <= 0.0 {
            return None;
        }
        let max_side = (self.modules as f64 * scale * self.cell).min(LOGO_MAX_FRACTION * self.side);
        let ratio = (max_side / logo_w as f64).min(max_side / logo_h as f64);
        let width = logo_w as f64 * ratio;
        let height = logo_h as f64 * ratio;
        let x = (self.side - width) / 2.0;
        let y = (self.side - height) / 2.0;

        let pad = LOGO_PAD_CELLS * self.cell;
        let pad_rect = RoundedRect {
            x: x - pad,
            y: y - pad,
            width: width + 2.0 * pad,
            height: height + 2.0 * pad,
            radius: LOGO_PAD_RADIUS_CELLS * self.cell,
            color: self.background,
        };
        Some(LogoFrame {
            x,
            y,
            width,
            height,
            pad: pad_rect,
        })
    }
}
