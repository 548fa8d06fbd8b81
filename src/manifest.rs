//! JSON description of one generation run, as consumed by `badgegen`.
//!
//! ```json
//! {
//!   "templates":  { "attendee": "templates/attendee.pdf", "staff": "templates/staff.pdf" },
//!   "placements": { "attendee": { "x": 89, "y": 60, "size": 120 } },
//!   "records_file": "attendees.json",
//!   "staff_ticket_types": ["Helpers"],
//!   "speaker_ticket_types": ["Speakers"],
//!   "style": { "foreground": "#1a1a1a", "logo": "logo.png", "logo_scale": 0.2 }
//! }
//! ```
//!
//! Relative paths resolve against the manifest's directory.

use crate::compose::QrSourceKind;
use crate::config::{GenerationConfigBuilder, Rgb, StyleConfig, TextConfig, DEFAULT_LOGO_SCALE};
use crate::error::BadgeError;
use crate::generate::GenerationRequest;
use crate::model::{AttendeeRecord, PlacementRect, Role, RoleLabels};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// QR style overrides; unset fields keep the badge defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleManifest {
    pub foreground: Option<Rgb>,
    pub background: Option<Rgb>,
    pub eye: Option<Rgb>,
    pub roundness: Option<f64>,
    pub logo: Option<PathBuf>,
    pub logo_scale: Option<f64>,
    pub cell_px: Option<u32>,
    pub quiet_zone: Option<u32>,
    pub gap_ratio: Option<f64>,
    pub dpi: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobManifest {
    pub templates: BTreeMap<Role, PathBuf>,
    #[serde(default)]
    pub placements: BTreeMap<Role, PlacementRect>,
    #[serde(default)]
    pub records: Vec<AttendeeRecord>,
    /// JSON array of records, appended after the inline ones.
    #[serde(default)]
    pub records_file: Option<PathBuf>,
    #[serde(default)]
    pub staff_ticket_types: Option<Vec<String>>,
    #[serde(default)]
    pub speaker_ticket_types: Option<Vec<String>>,
    #[serde(default)]
    pub style: StyleManifest,
    #[serde(default)]
    pub text: Option<TextConfig>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub qr_source: Option<QrSourceKind>,
}

impl JobManifest {
    /// Read, parse and validate a manifest; relative paths become absolute
    /// against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BadgeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| BadgeError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base)
            .map_err(|e| BadgeError::InvalidConfig(format!("manifest '{}': {e}", path.display())))
    }

    /// Parse manifest JSON, resolving relative paths against `base_dir`.
    pub fn from_json(json: &str, base_dir: &Path) -> Result<Self, BadgeError> {
        Self::parse(json, base_dir).map_err(BadgeError::InvalidConfig)
    }

    fn parse(json: &str, base_dir: &Path) -> Result<Self, String> {
        let mut manifest: JobManifest = serde_json::from_str(json).map_err(|e| e.to_string())?;
        manifest.resolve_paths(base_dir);
        manifest.validate()?;
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.templates.values_mut().for_each(resolve);
        self.records_file.iter_mut().for_each(resolve);
        self.style.logo.iter_mut().for_each(resolve);
        self.output_dir.iter_mut().for_each(resolve);
        if let Some(ref mut text) = self.text {
            text.font.iter_mut().for_each(resolve);
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.templates.is_empty() {
            return Err("at least one template is required".into());
        }
        for (role, placement) in &self.placements {
            if !placement.is_valid() {
                return Err(format!(
                    "placement for '{role}' must have a positive size, got {placement:?}"
                ));
            }
        }
        if let Some(ref text) = self.text {
            text.validate().map_err(|e| match e {
                BadgeError::InvalidConfig(msg) => msg,
                other => other.to_string(),
            })?;
        }
        Ok(())
    }

    /// Inline records followed by those of `records_file`.
    pub fn load_records(&self) -> Result<Vec<AttendeeRecord>, BadgeError> {
        let mut records = self.records.clone();
        if let Some(ref file) = self.records_file {
            let text = std::fs::read_to_string(file).map_err(|e| BadgeError::ReadFailed {
                path: file.clone(),
                source: e,
            })?;
            let from_file: Vec<AttendeeRecord> = serde_json::from_str(&text)
                .map_err(|e| BadgeError::InvalidConfig(format!("records file '{}': {e}", file.display())))?;
            debug!("Loaded {} records from {}", from_file.len(), file.display());
            records.extend(from_file);
        }
        Ok(records)
    }

    pub fn role_labels(&self) -> RoleLabels {
        let defaults = RoleLabels::default();
        RoleLabels {
            staff: self.staff_ticket_types.clone().unwrap_or(defaults.staff),
            speaker: self.speaker_ticket_types.clone().unwrap_or(defaults.speaker),
        }
    }

    pub fn style(&self) -> Result<StyleConfig, BadgeError> {
        let s = &self.style;
        let base = StyleConfig::badge_default();
        let mut builder = StyleConfig::builder()
            .foreground(s.foreground.unwrap_or(base.foreground))
            .background(s.background.unwrap_or(base.background))
            .roundness(s.roundness.unwrap_or(base.roundness))
            .cell_px(s.cell_px.unwrap_or(base.cell_px))
            .quiet_zone(s.quiet_zone.unwrap_or(base.quiet_zone))
            .gap_ratio(s.gap_ratio.unwrap_or(base.gap_ratio))
            .dpi(s.dpi.unwrap_or(base.dpi));
        if let Some(eye) = s.eye {
            builder = builder.eye(eye);
        }
        if let Some(ref logo) = s.logo {
            builder = builder.logo_path(logo, s.logo_scale.unwrap_or(DEFAULT_LOGO_SCALE));
        }
        builder.build()
    }

    /// Apply everything the manifest configures to a config builder.
    pub fn configure(&self, mut builder: GenerationConfigBuilder) -> Result<GenerationConfigBuilder, BadgeError> {
        builder = builder.role_labels(self.role_labels()).style(self.style()?);
        if let Some(ref text) = self.text {
            builder = builder.text(text.clone());
        }
        if let Some(ref dir) = self.output_dir {
            builder = builder.output_dir(dir);
        }
        if let Some(kind) = self.qr_source {
            builder = builder.qr_source(kind);
        }
        Ok(builder)
    }

    pub fn request(&self) -> Result<GenerationRequest, BadgeError> {
        Ok(GenerationRequest {
            records: self.load_records()?,
            templates: self.templates.iter().map(|(r, p)| (*r, p.clone())).collect(),
            placements: self.placements.iter().map(|(r, p)| (*r, *p)).collect(),
        })
    }

    /// Template and placement used for `role`, with the attendee fallbacks
    /// the pipeline applies.
    pub fn template_for(&self, role: Role) -> Result<(&Path, PlacementRect), BadgeError> {
        let template = self
            .templates
            .get(&role)
            .or_else(|| self.templates.get(&Role::Attendee))
            .or_else(|| self.templates.values().next())
            .ok_or_else(|| BadgeError::InvalidConfig("manifest has no templates".into()))?;
        let placement = self
            .placements
            .get(&role)
            .or_else(|| self.placements.get(&Role::Attendee))
            .ok_or_else(|| BadgeError::MissingPlacement { role: role.to_string() })?;
        Ok((template.as_path(), *placement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    const MANIFEST: &str = r##"{
        "templates": { "attendee": "t/attendee.pdf", "staff": "/abs/staff.pdf" },
        "placements": { "attendee": { "x": 89, "y": 60, "size": 120 } },
        "records": [ { "id": "1", "first_name": "Ana", "last_name": "Pérez", "ticket_type": "Crew" } ],
        "staff_ticket_types": ["Crew"],
        "style": { "foreground": "#1a1a1a", "roundness": 0.5, "logo": "logo.png" },
        "text": { "font": "fonts/DejaVuSans-Bold.ttf" },
        "qr_source": "vector"
    }"##;

    #[test]
    fn relative_paths_resolve_against_manifest_dir() {
        let m = JobManifest::from_json(MANIFEST, Path::new("/events/2026")).unwrap();
        assert_eq!(m.templates[&Role::Attendee], PathBuf::from("/events/2026/t/attendee.pdf"));
        assert_eq!(m.templates[&Role::Staff], PathBuf::from("/abs/staff.pdf"));
        assert_eq!(m.style.logo, Some(PathBuf::from("/events/2026/logo.png")));
        let font = m.text.and_then(|t| t.font);
        assert_eq!(font, Some(PathBuf::from("/events/2026/fonts/DejaVuSans-Bold.ttf")));
    }

    #[test]
    fn labels_and_style_are_applied() {
        let m = JobManifest::from_json(MANIFEST, Path::new("/x")).unwrap();
        assert_eq!(m.role_labels().resolve("Crew"), Role::Staff);
        assert_eq!(m.role_labels().resolve("Speakers"), Role::Speaker);

        let style = m.style().unwrap();
        assert_eq!(style.foreground, Rgb(0x1a, 0x1a, 0x1a));
        assert_eq!(style.roundness, 0.5);
        assert_eq!(style.logo.unwrap().scale, DEFAULT_LOGO_SCALE);

        let config = m.configure(GenerationConfig::builder()).unwrap().build().unwrap();
        assert_eq!(config.qr_source, QrSourceKind::Vector);
    }

    #[test]
    fn template_lookup_falls_back_to_attendee() {
        let m = JobManifest::from_json(MANIFEST, Path::new("/x")).unwrap();
        let (template, placement) = m.template_for(Role::Speaker).unwrap();
        assert_eq!(template, Path::new("/x/t/attendee.pdf"));
        assert_eq!(placement.size, 120.0);

        let bare = JobManifest::from_json(r#"{"templates":{"staff":"s.pdf"}}"#, Path::new("/x")).unwrap();
        assert!(matches!(
            bare.template_for(Role::Staff),
            Err(BadgeError::MissingPlacement { .. })
        ));
    }

    #[test]
    fn records_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("people.json"), r#"[{"id":"2","last_name":"Li"}]"#).unwrap();
        let json = r#"{
            "templates": { "attendee": "a.pdf" },
            "records": [ { "id": "1" } ],
            "records_file": "people.json"
        }"#;
        let m = JobManifest::from_json(json, dir.path()).unwrap();
        let ids: Vec<String> = m.load_records().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn invalid_manifests_are_rejected() {
        let base = Path::new("/x");
        assert!(JobManifest::from_json(r#"{"templates":{}}"#, base).is_err());
        assert!(JobManifest::from_json(r#"{"templates":{"vip":"a.pdf"}}"#, base).is_err());
        let bad_size = r#"{"templates":{"attendee":"a.pdf"},"placements":{"attendee":{"x":0,"y":0,"size":0}}}"#;
        assert!(matches!(
            JobManifest::from_json(bad_size, base),
            Err(BadgeError::InvalidConfig(_))
        ));
        assert!(JobManifest::from_json(r#"{"templates":{"attendee":"a.pdf"},"style":{"foreground":"blue"}}"#, base).is_err());
        let zero_step = r#"{"templates":{"attendee":"a.pdf"},"text":{"step":0}}"#;
        match JobManifest::from_json(zero_step, base) {
            Err(BadgeError::InvalidConfig(msg)) => assert!(msg.contains("step"), "got {msg}"),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(matches!(
            JobManifest::load("/nonexistent/manifest.json"),
            Err(BadgeError::ReadFailed { .. })
        ));
    }
}
