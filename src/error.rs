//! Error types for the badgeforge library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BadgeError`]: **Fatal** for the call that raised it: a QR payload
//!   that does not fit, an unreadable template, a job whose output directory
//!   cannot be created. Returned as `Err(BadgeError)` from the renderer, the
//!   compositor and [`crate::generate::run_job`].
//!
//! * [`RecordError`]: **Non-fatal**: one attendee could not be badged but
//!   the batch carries on. Stored inside [`crate::output::RecordResult`] and
//!   counted as `failed` on the job.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the badgeforge library.
///
/// Per-record failures inside a batch use [`RecordError`] instead.
#[derive(Debug, Error)]
pub enum BadgeError {
    // ── QR errors ─────────────────────────────────────────────────────────
    /// Payload exceeds the capacity of the largest QR version at level H.
    #[error("Cannot encode {len}-byte payload as a level-H QR code: {detail}")]
    Encoding { len: usize, detail: String },

    /// A requested logo or font could not be read or decoded.
    #[error("Asset '{source_name}' is unusable: {detail}")]
    Asset { source_name: String, detail: String },

    /// Raster or vector rendering of an already-encoded QR failed.
    #[error("QR rendering failed: {0}")]
    Render(String),

    // ── Template errors ───────────────────────────────────────────────────
    /// Template bytes are not a PDF lopdf can work with.
    #[error("Template '{name}' is unusable: {detail}")]
    Template { name: String, detail: String },

    /// No placement rectangle for the role nor for the attendee fallback.
    #[error("No QR placement configured for role '{role}' (nor for 'attendee')")]
    MissingPlacement { role: String },

    // ── Text errors ───────────────────────────────────────────────────────
    /// Badge text has characters the font has no glyphs for.
    #[error("Font '{font}' cannot show {chars:?} in '{text}'")]
    MissingGlyphs { font: String, text: String, chars: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or manifest validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Job errors ────────────────────────────────────────────────────────
    /// The batch could not run at all (no templates, bad output directory).
    #[error("Generation pipeline failed: {0}")]
    Pipeline(String),

    /// Every record was attempted but the archive step failed.
    #[error("Failed to archive badges into '{path}': {detail}")]
    Archive { path: PathBuf, detail: String },

    /// The job id is unknown to the store.
    #[error("Job '{0}' not found")]
    JobNotFound(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read an input file (template, logo, records).
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BadgeError {
    pub(crate) fn template(name: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        BadgeError::Template {
            name: name.into(),
            detail: detail.to_string(),
        }
    }
}

/// A non-fatal error for a single attendee record.
///
/// Stored alongside [`crate::output::RecordResult`]. The job still completes
/// when some records fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RecordError {
    /// The record cannot be badged as given (e.g. empty id).
    #[error("Record '{id}': {detail}")]
    InvalidRecord { id: String, detail: String },

    /// Neither the record's role nor the attendee role has a placement.
    #[error("Record '{id}': no placement for role '{role}'")]
    MissingPlacement { id: String, role: String },

    /// An earlier record of the batch already claimed the same output file
    /// (same id, or an id that sanitises to the same name).
    #[error("Record '{id}': output '{file}' already belongs to record '{first}'")]
    DuplicateId { id: String, first: String, file: String },

    /// Composition or output write failed.
    #[error("Record '{id}': composition failed: {detail}")]
    ComposeFailed { id: String, detail: String },

    /// The blocking worker panicked or was cancelled by the runtime.
    #[error("Record '{id}': worker task aborted: {detail}")]
    TaskPanicked { id: String, detail: String },
}

impl RecordError {
    /// Record id the error belongs to.
    pub fn id(&self) -> &str {
        match self {
            RecordError::InvalidRecord { id, .. }
            | RecordError::MissingPlacement { id, .. }
            | RecordError::DuplicateId { id, .. }
            | RecordError::ComposeFailed { id, .. }
            | RecordError::TaskPanicked { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_display_mentions_length() {
        let e = BadgeError::Encoding {
            len: 4000,
            detail: "data too long".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("4000-byte"), "got: {msg}");
        assert!(msg.contains("level-H"));
    }

    #[test]
    fn missing_placement_names_role() {
        let e = BadgeError::MissingPlacement {
            role: "staff".into(),
        };
        assert!(e.to_string().contains("'staff'"));
    }

    #[test]
    fn record_error_exposes_id() {
        let e = RecordError::MissingPlacement {
            id: "A-17".into(),
            role: "speaker".into(),
        };
        assert_eq!(e.id(), "A-17");
        assert!(e.to_string().contains("speaker"));
    }

    #[test]
    fn record_error_serialises() {
        let e = RecordError::ComposeFailed {
            id: "7".into(),
            detail: "template unreadable".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("ComposeFailed"));
        assert!(json.contains("template unreadable"));
    }
}
