//! Progress-callback trait for per-record generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to follow a
//! batch as it runs. The CLI drives an `indicatif` bar from it; a service
//! could forward the same events to a channel or a status table.
//!
//! Polling [`crate::job::JobStore::status`] gives the same counters without a
//! callback.
//!
//! # Example
//!
//! ```rust
//! use badgeforge::{GenerationConfig, GenerationProgressCallback, RecordOutcome, Role};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_record_complete(&self, id: &str, role: Role, outcome: RecordOutcome) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{n} {id} ({role}): {outcome}");
//!     }
//! }
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::RecordError;
use crate::model::Role;
use crate::output::RecordOutcome;
use std::sync::Arc;

/// Called by the generation pipeline as it works through a batch.
///
/// Records are processed concurrently, so the per-record methods may be
/// called from several threads at once and in any order. All methods default
/// to no-ops.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once, after the job moves to `running` and before any record.
    fn on_job_start(&self, job_id: &str, total_records: usize) {
        let _ = (job_id, total_records);
    }

    /// Called when a worker picks up a record.
    fn on_record_start(&self, id: &str) {
        let _ = id;
    }

    /// Called when a record ends as generated or skipped.
    fn on_record_complete(&self, id: &str, role: Role, outcome: RecordOutcome) {
        let _ = (id, role, outcome);
    }

    /// Called when a record fails. The batch continues.
    fn on_record_error(&self, error: &RecordError) {
        let _ = error;
    }

    /// Called once after every record was attempted and archiving finished
    /// (or failed).
    fn on_job_complete(&self, generated: usize, skipped: usize, failed: usize) {
        let _ = (generated, skipped, failed);
    }
}

/// No-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
