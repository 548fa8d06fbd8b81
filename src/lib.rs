//! # badgeforge
//!
//! Styled QR codes and personalised PDF event badges.
//!
//! ## Why this crate?
//!
//! Stock QR output is a grid of black squares: functional, but it looks out
//! of place on a designed badge. This crate draws its own QR from the raw
//! level-H bit matrix (rounded modules, squircle finder patterns, an optional
//! centre logo kept small enough to stay decodable) and stamps it together
//! with the attendee's name and company onto a designer-made PDF template,
//! one badge per attendee, many at a time.
//!
//! ## Pipeline Overview
//!
//! ```text
//! records + templates (per role) + placements (per role)
//!  │
//!  ├─ 1. Role     ticket type → attendee | speaker | staff
//!  ├─ 2. Skip     incremental mode: finished badge already on disk?
//!  ├─ 3. Place    role placement, falling back to the attendee one
//!  ├─ 4. QR       level-H matrix → rounded shapes → raster or PDF paths
//!  ├─ 5. Text     last / first name and company, shrunk to fit
//!  ├─ 6. Stamp    overlay on a fresh copy of the template page
//!  └─ 7. Archive  every finished badge zipped once the batch is done
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use badgeforge::{generate, GenerationConfig, GenerationRequest, JobStore, PlacementRect, Role};
//! use badgeforge::AttendeeRecord;
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = GenerationRequest {
//!         records: vec![AttendeeRecord::new("99000000001", "María", "García", "Speakers")],
//!         templates: HashMap::from([(Role::Attendee, "templates/attendee.pdf".into())]),
//!         placements: HashMap::from([(Role::Attendee, PlacementRect::new(89.0, 60.0, 120.0))]),
//!     };
//!     let config = GenerationConfig::builder().output_dir("badges").build()?;
//!
//!     let store = JobStore::new();
//!     let handle = store.create_job(request.records.len());
//!     let summary = generate::run_job(&handle, request, &config).await?;
//!     eprintln!("{} generated, archive at {:?}", summary.job.generated, summary.archive());
//!     Ok(())
//! }
//! ```
//!
//! A single QR without any badge:
//!
//! ```rust,no_run
//! use badgeforge::{qr, StyleConfig};
//!
//! let style = StyleConfig::builder().roundness(0.9).logo_path("logo.png", 0.22).build().unwrap();
//! let rendered = qr::render("https://example.org", &style).unwrap();
//! rendered.save("ticket").unwrap(); // ticket.png + ticket.svg
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `badgegen` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! badgeforge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod compose;
pub mod config;
pub mod error;
pub mod generate;
pub mod job;
pub mod manifest;
pub mod model;
pub mod output;
pub mod progress;
pub mod qr;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{Archiver, ZipArchiver};
pub use compose::{compose_badge, compose_to_file, inspect_template, preview, QrSourceKind, TemplateInfo};
pub use config::{GenerationConfig, GenerationConfigBuilder, Rgb, StyleConfig, StyleConfigBuilder, TextConfig};
pub use error::{BadgeError, RecordError};
pub use generate::{run_job, spawn_job, GenerationRequest};
pub use job::{GenerationJob, JobHandle, JobStatus, JobStore};
pub use manifest::JobManifest;
pub use model::{AttendeeRecord, BadgeText, PlacementRect, Role, RoleLabels};
pub use output::{GenerationSummary, RecordOutcome, RecordResult};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use qr::{render, RenderedQr};
