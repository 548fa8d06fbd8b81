//! Vector backend: serialise a [`QrLayout`] as a standalone SVG document.

use crate::error::BadgeError;
use crate::qr::geometry::{QrLayout, RoundedRect};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbaImage;
use std::fmt::Write as _;
use std::io::Cursor;

/// Cell unit of the SVG coordinate system.
pub const SVG_CELL: f64 = 10.0;

/// Write the SVG document. The logo, when present, is embedded as a PNG
/// data URI over its background pad.
pub fn write_svg(layout: &QrLayout, logo: Option<(&RgbaImage, f64)>) -> Result<String, BadgeError> {
    let side = layout.side;
    let mut out = String::with_capacity(64 * (layout.shapes.len() + 4));

    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" viewBox="0 0 {s:.3} {s:.3}" width="{s:.3}" height="{s:.3}" shape-rendering="geometricPrecision">"#,
        s = side
    );
    let _ = writeln!(
        out,
        r#"<rect x="0" y="0" width="{s:.3}" height="{s:.3}" fill="{}"/>"#,
        layout.background.to_hex(),
        s = side
    );
    for shape in &layout.shapes {
        push_rect(&mut out, shape);
    }

    if let Some((logo, scale)) = logo {
        if let Some(frame) = layout.logo_frame(scale, logo.width(), logo.height()) {
            push_rect(&mut out, &frame.pad);
            let _ = writeln!(
                out,
                r#"<image x="{:.3}" y="{:.3}" width="{:.3}" height="{:.3}" preserveAspectRatio="xMidYMid meet" xlink:href="data:image/png;base64,{}"/>"#,
                frame.x,
                frame.y,
                frame.width,
                frame.height,
                encode_data_uri(logo)?
            );
        }
    }

    out.push_str("</svg>\n");
    Ok(out)
}

fn push_rect(out: &mut String, r: &RoundedRect) {
    if r.radius > 0.0 {
        let _ = writeln!(
            out,
            r#"<rect x="{:.3}" y="{:.3}" width="{:.3}" height="{:.3}" rx="{:.3}" ry="{:.3}" fill="{}"/>"#,
            r.x,
            r.y,
            r.width,
            r.height,
            r.radius,
            r.radius,
            r.color.to_hex()
        );
    } else {
        let _ = writeln!(
            out,
            r#"<rect x="{:.3}" y="{:.3}" width="{:.3}" height="{:.3}" fill="{}"/>"#,
            r.x,
            r.y,
            r.width,
            r.height,
            r.color.to_hex()
        );
    }
}

fn encode_data_uri(logo: &RgbaImage) -> Result<String, BadgeError> {
    let mut buf = Vec::new();
    logo.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| BadgeError::Render(format!("logo PNG encoding: {e}")))?;
    Ok(STANDARD.encode(&buf))
}
