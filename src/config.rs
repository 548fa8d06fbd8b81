//! Configuration types for QR styling, badge text layout and batch generation.
//!
//! Three structs carry every knob:
//!
//! * [`StyleConfig`]: how a QR looks (colours, roundness, logo, pixel size).
//! * [`TextConfig`]: how names and company are laid out above the QR.
//! * [`GenerationConfig`]: how a batch runs (concurrency, incremental mode,
//!   output directory, role labels, progress and archive hooks).
//!
//! `StyleConfig` and `GenerationConfig` are built via builders whose setters
//! clamp to the valid range; `build()` rejects what clamping cannot fix.

use crate::archive::Archiver;
use crate::compose::QrSourceKind;
use crate::error::BadgeError;
use crate::model::RoleLabels;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

// ── Colours ──────────────────────────────────────────────────────────────

static HEX_COLOUR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?([0-9a-fA-F]{6}|[0-9a-fA-F]{3})$").unwrap());

/// An opaque sRGB colour, written as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(0xFF, 0xFF, 0xFF);
    /// Company line colour on badges.
    pub const BRAND_BLUE: Rgb = Rgb(0x00, 0x5B, 0xAB);

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    /// Components as PDF `rg` operands in `[0, 1]`.
    pub fn to_unit(self) -> [f32; 3] {
        [
            self.0 as f32 / 255.0,
            self.1 as f32 / 255.0,
            self.2 as f32 / 255.0,
        ]
    }

    pub fn channels(self) -> [u8; 3] {
        [self.0, self.1, self.2]
    }
}

impl FromStr for Rgb {
    type Err = BadgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = HEX_COLOUR
            .captures(s.trim())
            .ok_or_else(|| BadgeError::InvalidConfig(format!("'{s}' is not a #RRGGBB colour")))?;
        let hex = &caps[1];
        let digits: Vec<u8> = if hex.len() == 3 {
            hex.chars().flat_map(|c| [c, c]).map(hex_digit).collect()
        } else {
            hex.chars().map(hex_digit).collect()
        };
        Ok(Rgb(
            digits[0] * 16 + digits[1],
            digits[2] * 16 + digits[3],
            digits[4] * 16 + digits[5],
        ))
    }
}

fn hex_digit(c: char) -> u8 {
    c.to_digit(16).map(|d| d as u8).unwrap_or(0)
}

impl TryFrom<String> for Rgb {
    type Error = BadgeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        c.to_hex()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ── QR style ─────────────────────────────────────────────────────────────

/// Where logo pixels come from.
#[derive(Clone)]
pub enum LogoSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl LogoSource {
    /// Short label for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            LogoSource::Path(p) => p.display().to_string(),
            LogoSource::Bytes(b) => format!("<{} bytes in memory>", b.len()),
        }
    }
}

impl fmt::Debug for LogoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Logo overlaid at the centre of the QR.
#[derive(Debug, Clone)]
pub struct Logo {
    pub source: LogoSource,
    /// Logo side as a fraction of the matrix side. Default: 0.22.
    ///
    /// Whatever the scale, the placed side never exceeds
    /// [`LOGO_MAX_FRACTION`] of the full image side.
    pub scale: f64,
}

/// Upper bound on the logo side relative to the image side, so the logo
/// stays inside what level-H error correction can recover.
pub const LOGO_MAX_FRACTION: f64 = 0.28;

pub const DEFAULT_LOGO_SCALE: f64 = 0.22;

/// Roundness used for QR codes stamped on badges.
pub const BADGE_ROUNDNESS: f64 = 0.85;

/// Visual style of a rendered QR code. Pure value; share freely.
#[derive(Debug, Clone)]
pub struct StyleConfig {
    /// Data module colour. Default: black.
    pub foreground: Rgb,
    /// Background and quiet-zone colour. Default: white.
    pub background: Rgb,
    /// Finder pattern colour. `None` uses the foreground.
    pub eye: Option<Rgb>,
    /// 0 = sharp squares, 1 = fully round modules. Default: 0.8.
    pub roundness: f64,
    pub logo: Option<Logo>,
    /// Raster pixels per module. Default: 40.
    pub cell_px: u32,
    /// Quiet zone width in modules. Default: 4.
    pub quiet_zone: u32,
    /// Gap between neighbouring modules as a fraction of the cell. Default: 0.12.
    pub gap_ratio: f64,
    /// Resolution written into the PNG. Default: 300.
    pub dpi: u32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            foreground: Rgb::BLACK,
            background: Rgb::WHITE,
            eye: None,
            roundness: 0.8,
            logo: None,
            cell_px: 40,
            quiet_zone: 4,
            gap_ratio: 0.12,
            dpi: 300,
        }
    }
}

impl StyleConfig {
    pub fn builder() -> StyleConfigBuilder {
        StyleConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default style for QR codes stamped on badges.
    pub fn badge_default() -> Self {
        Self {
            roundness: BADGE_ROUNDNESS,
            ..Self::default()
        }
    }

    pub fn eye_color(&self) -> Rgb {
        self.eye.unwrap_or(self.foreground)
    }

    fn validate(&self) -> Result<(), BadgeError> {
        if !self.roundness.is_finite() {
            return Err(BadgeError::InvalidConfig(format!(
                "roundness must be a number in [0, 1], got {}",
                self.roundness
            )));
        }
        if !self.gap_ratio.is_finite() {
            return Err(BadgeError::InvalidConfig("gap ratio must be finite".into()));
        }
        if let Some(ref logo) = self.logo {
            if !logo.scale.is_finite() || logo.scale <= 0.0 {
                return Err(BadgeError::InvalidConfig(format!(
                    "logo scale must be > 0, got {}",
                    logo.scale
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`StyleConfig`].
#[derive(Debug)]
pub struct StyleConfigBuilder {
    config: StyleConfig,
}

impl StyleConfigBuilder {
    pub fn foreground(mut self, c: Rgb) -> Self {
        self.config.foreground = c;
        self
    }

    pub fn background(mut self, c: Rgb) -> Self {
        self.config.background = c;
        self
    }

    pub fn eye(mut self, c: Rgb) -> Self {
        self.config.eye = Some(c);
        self
    }

    /// Clamped to `[0, 1]`. NaN is rejected by `build()`.
    pub fn roundness(mut self, r: f64) -> Self {
        self.config.roundness = if r.is_nan() { r } else { r.clamp(0.0, 1.0) };
        self
    }

    pub fn logo_path(mut self, path: impl Into<PathBuf>, scale: f64) -> Self {
        self.config.logo = Some(Logo {
            source: LogoSource::Path(path.into()),
            scale,
        });
        self
    }

    pub fn logo_bytes(mut self, bytes: impl Into<Arc<[u8]>>, scale: f64) -> Self {
        self.config.logo = Some(Logo {
            source: LogoSource::Bytes(bytes.into()),
            scale,
        });
        self
    }

    pub fn cell_px(mut self, px: u32) -> Self {
        self.config.cell_px = px.clamp(4, 200);
        self
    }

    pub fn quiet_zone(mut self, cells: u32) -> Self {
        self.config.quiet_zone = cells.min(16);
        self
    }

    pub fn gap_ratio(mut self, g: f64) -> Self {
        self.config.gap_ratio = if g.is_nan() { g } else { g.clamp(0.0, 0.45) };
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 1200);
        self
    }

    /// Build the style, validating constraints.
    pub fn build(self) -> Result<StyleConfig, BadgeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Badge text ───────────────────────────────────────────────────────────

/// Text layout of the name/company band above the QR, in PDF points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Starting size for first and last name. Default: 22.
    pub name_size: f32,
    /// Starting size for the company line. Default: 18.
    pub company_size: f32,
    /// Sizes never shrink below this. Default: 8.
    pub min_size: f32,
    /// Shrink step. Default: 1.
    pub step: f32,
    /// Subtracted from the band width on top of the side margins. Default: 4.
    pub margin: f32,
    /// Gap between the QR top and the first baseline. Default: 10.
    pub qr_gap: f32,
    /// Extra gap after the last-name line. Default: 6.
    pub name_gap: f32,
    /// Extra gap after the first-name line. Default: 4.
    pub company_gap: f32,
    pub ink: Rgb,
    pub brand: Rgb,
    /// TrueType font embedded for the text. Standard Helvetica-Bold when
    /// unset, which only covers WinAnsi (cp1252) characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<PathBuf>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            name_size: 22.0,
            company_size: 18.0,
            min_size: 8.0,
            step: 1.0,
            margin: 4.0,
            qr_gap: 10.0,
            name_gap: 6.0,
            company_gap: 4.0,
            ink: Rgb::BLACK,
            brand: Rgb::BRAND_BLUE,
            font: None,
        }
    }
}

impl TextConfig {
    /// Sizes and gaps must be finite, with `0 < min ≤ start` and `step > 0`.
    pub fn validate(&self) -> Result<(), BadgeError> {
        let sizes = [self.name_size, self.company_size, self.min_size, self.step];
        let gaps = [self.margin, self.qr_gap, self.name_gap, self.company_gap];
        if sizes.iter().chain(gaps.iter()).any(|v| !v.is_finite()) {
            return Err(BadgeError::InvalidConfig(format!(
                "Text sizes and gaps must be finite numbers: {self:?}"
            )));
        }
        if !(self.min_size > 0.0
            && self.step > 0.0
            && self.name_size >= self.min_size
            && self.company_size >= self.min_size)
        {
            return Err(BadgeError::InvalidConfig(format!(
                "Text sizes must satisfy 0 < min ≤ start and step > 0 (min {}, step {}, name {}, company {})",
                self.min_size, self.step, self.name_size, self.company_size
            )));
        }
        Ok(())
    }
}

// ── Generation ───────────────────────────────────────────────────────────

/// Configuration for a batch generation job.
///
/// Built via [`GenerationConfig::builder()`] or [`GenerationConfig::default()`].
///
/// # Example
/// ```rust
/// use badgeforge::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .concurrency(8)
///     .incremental(true)
///     .output_dir("out/badges")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Records composed at the same time. Default: 4.
    ///
    /// Composition is CPU-bound and runs on the blocking pool, so this also
    /// bounds how many template copies and QR rasters live in memory.
    pub concurrency: usize,

    /// Skip records whose output badge already exists. Default: true.
    pub incremental: bool,

    /// Directory the badges and the archive are written to. Default: `badges`.
    ///
    /// One directory per job; two jobs sharing it race on the skip check.
    pub output_dir: PathBuf,

    /// Ticket-type labels for the staff and speaker roles.
    pub role_labels: RoleLabels,

    /// QR style for every badge of the batch.
    pub style: StyleConfig,

    pub text: TextConfig,

    /// Raster (PNG-equivalent image) or vector (PDF paths) QR. Default: raster.
    pub qr_source: QrSourceKind,

    /// Receives per-record events. `None` disables callbacks.
    pub progress_callback: Option<ProgressCallback>,

    /// Archive step. `None` uses [`crate::archive::ZipArchiver`].
    pub archiver: Option<Arc<dyn Archiver>>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            incremental: true,
            output_dir: PathBuf::from("badges"),
            role_labels: RoleLabels::default(),
            style: StyleConfig::badge_default(),
            text: TextConfig::default(),
            qr_source: QrSourceKind::default(),
            progress_callback: None,
            archiver: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("concurrency", &self.concurrency)
            .field("incremental", &self.incremental)
            .field("output_dir", &self.output_dir)
            .field("role_labels", &self.role_labels)
            .field("style", &self.style)
            .field("text", &self.text)
            .field("qr_source", &self.qr_source)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .field("archiver", &self.archiver.as_ref().map(|_| "<dyn Archiver>"))
            .finish()
    }
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn incremental(mut self, v: bool) -> Self {
        self.config.incremental = v;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn role_labels(mut self, labels: RoleLabels) -> Self {
        self.config.role_labels = labels;
        self
    }

    pub fn staff_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.role_labels.staff = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn speaker_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.role_labels.speaker = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn style(mut self, style: StyleConfig) -> Self {
        self.config.style = style;
        self
    }

    pub fn text(mut self, text: TextConfig) -> Self {
        self.config.text = text;
        self
    }

    pub fn qr_source(mut self, kind: QrSourceKind) -> Self {
        self.config.qr_source = kind;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.config.archiver = Some(archiver);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, BadgeError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(BadgeError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(BadgeError::InvalidConfig("Output directory must not be empty".into()));
        }
        c.text.validate()?;
        c.style.validate()?;
        Ok(self.config)
    }
}
