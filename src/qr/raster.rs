//! Raster backend: paint a [`QrLayout`] into an RGB image and encode it as a
//! PNG that carries its DPI.
//!
//! Edges are anti-aliased with a fixed 4×4 supersampling grid, so output is
//! byte-for-byte deterministic for a given layout.

use crate::error::BadgeError;
use crate::qr::geometry::{QrLayout, RoundedRect};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbImage, RgbaImage};
use tracing::debug;

const SUBSAMPLES: u32 = 4;

/// Paint every shape of `layout`, then the logo (if any) on its pad.
pub fn paint(layout: &QrLayout, logo: Option<(&RgbaImage, f64)>) -> RgbImage {
    let side = layout.side.round().max(1.0) as u32;
    let [r, g, b] = layout.background.channels();
    let mut img = RgbaImage::from_pixel(side, side, Rgba([r, g, b, 255]));

    for shape in &layout.shapes {
        fill_rounded_rect(&mut img, shape);
    }

    if let Some((logo, scale)) = logo {
        if let Some(frame) = layout.logo_frame(scale, logo.width(), logo.height()) {
            fill_rounded_rect(&mut img, &frame.pad);
            let w = frame.width.floor().max(1.0) as u32;
            let h = frame.height.floor().max(1.0) as u32;
            let resized = imageops::resize(logo, w, h, FilterType::Lanczos3);
            let x = (side.saturating_sub(w) / 2) as i64;
            let y = (side.saturating_sub(h) / 2) as i64;
            imageops::overlay(&mut img, &resized, x, y);
            debug!("Logo placed at ({x}, {y}) size {w}x{h} on {side}px QR");
        }
    }

    DynamicImage::ImageRgba8(img).into_rgb8()
}

/// Encode as PNG with a `pHYs` chunk for `dpi`.
pub fn encode_png(img: &RgbImage, dpi: u32) -> Result<Vec<u8>, BadgeError> {
    let mut buf = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buf, img.width(), img.height());
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let per_metre = (dpi as f64 / 0.0254).round() as u32;
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: per_metre,
            yppu: per_metre,
            unit: png::Unit::Meter,
        }));
        let mut writer = encoder
            .write_header()
            .map_err(|e| BadgeError::Render(format!("PNG header: {e}")))?;
        writer
            .write_image_data(img.as_raw())
            .map_err(|e| BadgeError::Render(format!("PNG data: {e}")))?;
        writer
            .finish()
            .map_err(|e| BadgeError::Render(format!("PNG trailer: {e}")))?;
    }
    Ok(buf)
}

/// Blend one rounded rectangle into `img` with supersampled coverage.
fn fill_rounded_rect(img: &mut RgbaImage, rect: &RoundedRect) {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    let (w, h) = (img.width() as f64, img.height() as f64);
    let x0 = rect.x.floor().clamp(0.0, w) as u32;
    let y0 = rect.y.floor().clamp(0.0, h) as u32;
    let x1 = (rect.x + rect.width).ceil().clamp(0.0, w) as u32;
    let y1 = (rect.y + rect.height).ceil().clamp(0.0, h) as u32;
    let color = rect.color.channels();
    let total = (SUBSAMPLES * SUBSAMPLES) as f64;

    for py in y0..y1 {
        for px in x0..x1 {
            let coverage = if pixel_fully_inside(rect, px as f64, py as f64) {
                1.0
            } else {
                let mut hits = 0u32;
                for sy in 0..SUBSAMPLES {
                    for sx in 0..SUBSAMPLES {
                        let fx = px as f64 + (sx as f64 + 0.5) / SUBSAMPLES as f64;
                        let fy = py as f64 + (sy as f64 + 0.5) / SUBSAMPLES as f64;
                        if contains(rect, fx, fy) {
                            hits += 1;
                        }
                    }
                }
                hits as f64 / total
            };
            if coverage <= 0.0 {
                continue;
            }
            let pixel = img.get_pixel_mut(px, py);
            for i in 0..3 {
                let old = pixel[i] as f64;
                pixel[i] = (old + (color[i] as f64 - old) * coverage).round() as u8;
            }
        }
    }
}

fn contains(rect: &RoundedRect, px: f64, py: f64) -> bool {
    let (right, bottom) = (rect.x + rect.width, rect.y + rect.height);
    if px < rect.x || py < rect.y || px > right || py > bottom {
        return false;
    }
    let r = rect.radius;
    if r <= 0.0 {
        return true;
    }
    let cx = px.max(rect.x + r).min(right - r);
    let cy = py.max(rect.y + r).min(bottom - r);
    let (dx, dy) = (px - cx, py - cy);
    dx * dx + dy * dy <= r * r
}

/// Whole pixel inside the straight-edged cross of the rounded rectangle.
fn pixel_fully_inside(rect: &RoundedRect, px: f64, py: f64) -> bool {
    let (right, bottom) = (rect.x + rect.width, rect.y + rect.height);
    if px < rect.x || py < rect.y || px + 1.0 > right || py + 1.0 > bottom {
        return false;
    }
    let r = rect.radius;
    (px >= rect.x + r && px + 1.0 <= right - r) || (py >= rect.y + r && py + 1.0 <= bottom - r)
}
