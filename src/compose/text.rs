//! Adaptive sizing and stacking of the name/company lines above the QR.

use crate::compose::fonts::TextMetrics;
use crate::config::{Rgb, TextConfig};
use crate::model::{BadgeText, PlacementRect};

/// One positioned line of badge text, PDF coordinates (y up).
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub size: f32,
    /// Left edge of the centred line.
    pub x: f32,
    pub baseline: f32,
    pub color: Rgb,
}

/// Largest size from `start` down by `step` at which `text` fits `max_width`,
/// never below `min`.
///
/// Text that does not fit even at `min` is drawn at `min` and may overflow.
/// A step that is not a positive number counts as 1.
pub fn fit_font_size(
    metrics: &dyn TextMetrics,
    text: &str,
    max_width: f32,
    start: f32,
    min: f32,
    step: f32,
) -> f32 {
    let step = if step.is_finite() && step > 0.0 { step } else { 1.0 };
    let mut size = start.max(min);
    if !size.is_finite() {
        return min;
    }
    while size > min && metrics.text_width(text, size) > max_width {
        size = (size - step).max(min);
    }
    size
}

/// Lay out last name, first name and company (upper-cased), bottom-up from
/// the QR top.
///
/// The band is centred on the page and `page_width − 2·placement.x − margin`
/// wide. Empty lines are skipped and take no vertical space.
pub fn layout_lines(
    metrics: &dyn TextMetrics,
    text: &BadgeText,
    page_width: f32,
    placement: &PlacementRect,
    cfg: &TextConfig,
) -> Vec<TextLine> {
    let max_width = page_width - 2.0 * placement.x - cfg.margin;
    let centre = page_width / 2.0;

    let company = text.company.as_deref().unwrap_or_default();
    let candidates = [
        (text.last_name.to_uppercase(), cfg.name_size, cfg.ink, cfg.name_gap),
        (text.first_name.to_uppercase(), cfg.name_size, cfg.ink, cfg.company_gap),
        (company.to_uppercase(), cfg.company_size, cfg.brand, 0.0),
    ];

    let mut lines = Vec::with_capacity(3);
    let mut baseline = placement.top() + cfg.qr_gap;
    for (content, start, color, gap_after) in candidates {
        if content.trim().is_empty() {
            continue;
        }
        let size = fit_font_size(metrics, &content, max_width, start, cfg.min_size, cfg.step);
        let width = metrics.text_width(&content, size);
        lines.push(TextLine {
            x: centre - width / 2.0,
            baseline,
            size,
            color,
            text: content,
        });
        baseline += size + gap_after;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::fonts::{FontMetrics, HELVETICA_BOLD};

    fn helvetica() -> &'static FontMetrics {
        &HELVETICA_BOLD
    }

    fn text(first: &str, last: &str, company: Option<&str>) -> BadgeText {
        BadgeText {
            first_name: first.into(),
            last_name: last.into(),
            company: company.map(Into::into),
        }
    }

    #[test]
    fn short_text_keeps_start_size() {
        let size = fit_font_size(helvetica(), "LI", 200.0, 22.0, 8.0, 1.0);
        assert_eq!(size, 22.0);
    }

    #[test]
    fn long_text_shrinks_until_it_fits() {
        let t = "MONTGOMERY-FITZWILLIAM";
        let size = fit_font_size(helvetica(), t, 200.0, 22.0, 8.0, 1.0);
        assert!(size < 22.0);
        assert!(HELVETICA_BOLD.text_width(t, size) <= 200.0);
        assert!(HELVETICA_BOLD.text_width(t, size + 1.0) > 200.0);
    }

    #[test]
    fn floor_is_respected_and_may_overflow() {
        let t = "W".repeat(200);
        let size = fit_font_size(helvetica(), &t, 50.0, 22.0, 8.0, 1.0);
        assert_eq!(size, 8.0);
    }

    #[test]
    fn non_positive_width_goes_straight_to_floor() {
        assert_eq!(fit_font_size(helvetica(), "A", -10.0, 18.0, 8.0, 1.0), 8.0);
    }

    #[test]
    fn degenerate_steps_still_terminate() {
        let t = "GARCÍA FERNÁNDEZ";
        let zero = fit_font_size(helvetica(), t, 50.0, 22.0, 8.0, 0.0);
        let negative = fit_font_size(helvetica(), t, 50.0, 22.0, 8.0, -3.0);
        let nan = fit_font_size(helvetica(), t, 50.0, 22.0, 8.0, f32::NAN);
        assert_eq!(zero, fit_font_size(helvetica(), t, 50.0, 22.0, 8.0, 1.0));
        assert_eq!(negative, zero);
        assert_eq!(nan, zero);
        assert_eq!(fit_font_size(helvetica(), t, 50.0, f32::INFINITY, 8.0, 1.0), 8.0);
        assert_eq!(fit_font_size(helvetica(), "LI", 200.0, 22.0, f32::NAN, 1.0), 22.0);
    }

    #[test]
    fn lines_stack_bottom_up() {
        let p = PlacementRect::new(60.0, 100.0, 120.0);
        let lines = layout_lines(
            helvetica(),
            &text("María", "García", Some("Contoso Ltd.")),
            300.0,
            &p,
            &TextConfig::default(),
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "GARCÍA");
        assert_eq!(lines[0].baseline, 230.0);
        assert_eq!(lines[1].text, "MARÍA");
        assert_eq!(lines[2].text, "CONTOSO LTD.");
        assert_eq!(lines[1].baseline, 230.0 + lines[0].size + 6.0);
        assert_eq!(lines[2].baseline, lines[1].baseline + lines[1].size + 4.0);
        assert_eq!(lines[2].color, Rgb::BRAND_BLUE);
        assert_eq!(lines[0].color, Rgb::BLACK);
        for l in &lines {
            let w = HELVETICA_BOLD.text_width(&l.text, l.size);
            assert!((l.x + w / 2.0 - 150.0).abs() < 1e-3, "{} not centred", l.text);
        }
    }

    #[test]
    fn missing_company_and_first_name_take_no_space() {
        let p = PlacementRect::new(60.0, 100.0, 120.0);
        let lines = layout_lines(helvetica(), &text("", "Doe", None), 300.0, &p, &TextConfig::default());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "DOE");
    }

    #[test]
    fn band_width_depends_on_placement_x() {
        let name = text("", "Bartholomew-Richardson", None);
        let cfg = TextConfig::default();
        let wide = layout_lines(helvetica(), &name, 300.0, &PlacementRect::new(10.0, 0.0, 50.0), &cfg);
        let narrow = layout_lines(helvetica(), &name, 300.0, &PlacementRect::new(60.0, 0.0, 50.0), &cfg);
        assert!(narrow[0].size < wide[0].size);
        assert!(HELVETICA_BOLD.text_width(&narrow[0].text, narrow[0].size) <= 300.0 - 120.0 - 4.0);
    }
}
