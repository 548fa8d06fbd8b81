//! Batch generation: one badge per attendee record.
//!
//! ## Flow
//!
//! ```text
//! records ──▶ claim output names ──▶ stream::iter ──buffer_unordered(concurrency)──▶ join ──▶ archive
//!                                       │
//!                                       └─ per record, on the blocking pool:
//!                                          role → output path → incremental check
//!                                               → placement → template → compose_to_file
//! ```
//!
//! Per-record problems never abort the batch; they become
//! [`RecordOutcome::Failed`] entries. A record whose output file an earlier
//! record already claimed fails with [`RecordError::DuplicateId`]. Only
//! pipeline-level problems (no templates, unusable output directory,
//! archive failure, cancellation) fail the job and return `Err`.

use crate::archive::{Archiver, ZipArchiver};
use crate::compose::{compose_to_file, BadgeRequest, QrSource};
use crate::config::{GenerationConfig, TextConfig};
use crate::error::{BadgeError, RecordError};
use crate::job::{JobHandle, JobStore};
use crate::model::{AttendeeRecord, PlacementRect, Role, RoleLabels};
use crate::output::{GenerationSummary, RecordOutcome, RecordResult};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Inputs of one generation run, as handed over by the collaborators.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub records: Vec<AttendeeRecord>,
    /// Template PDF per role. At least one is required.
    pub templates: HashMap<Role, PathBuf>,
    /// QR placement per role; [`Role::Attendee`] is the fallback.
    pub placements: HashMap<Role, PlacementRect>,
}

/// Read-only context shared by all workers of one job.
struct Batch {
    templates: HashMap<Role, PathBuf>,
    placements: HashMap<Role, PlacementRect>,
    labels: RoleLabels,
    output_dir: PathBuf,
    incremental: bool,
    source: Arc<dyn QrSource>,
    text: TextConfig,
}

impl Batch {
    fn placement_for(&self, role: Role) -> Option<PlacementRect> {
        self.placements
            .get(&role)
            .or_else(|| self.placements.get(&Role::Attendee))
            .copied()
    }

    /// Role template, then the attendee one, then any configured template.
    fn template_for(&self, role: Role) -> Option<&Path> {
        self.templates
            .get(&role)
            .or_else(|| self.templates.get(&Role::Attendee))
            .or_else(|| Role::ALL.iter().find_map(|r| self.templates.get(r)))
            .map(PathBuf::as_path)
    }

    fn process(&self, record: &AttendeeRecord, role: Role) -> Result<(RecordOutcome, PathBuf), RecordError> {
        let id = record.id.trim();
        if id.is_empty() {
            return Err(RecordError::InvalidRecord {
                id: record.id.clone(),
                detail: "empty id".to_string(),
            });
        }

        let output = self.output_dir.join(output_file_name(id));
        if self.incremental && is_finished_badge(&output) {
            debug!("Record {id}: {} already exists, skipping", output.display());
            return Ok((RecordOutcome::Skipped, output));
        }

        let placement = self.placement_for(role).ok_or_else(|| RecordError::MissingPlacement {
            id: id.to_string(),
            role: role.to_string(),
        })?;
        let template = self.template_for(role).ok_or_else(|| RecordError::ComposeFailed {
            id: id.to_string(),
            detail: "no template configured".to_string(),
        })?;

        let text = record.badge_text();
        let request = BadgeRequest {
            qr_data: id,
            text: &text,
            placement,
        };
        compose_to_file(template, &output, &request, self.source.as_ref(), &self.text).map_err(|e| {
            RecordError::ComposeFailed {
                id: id.to_string(),
                detail: e.to_string(),
            }
        })?;
        debug!("Record {id}: wrote {} ({role})", output.display());
        Ok((RecordOutcome::Generated, output))
    }
}

static UNSAFE_ID_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// `attendee-<id>.pdf`, with every character outside `[A-Za-z0-9_-]`
/// replaced by `_` so ids can never escape the output directory.
pub fn output_file_name(id: &str) -> String {
    format!("attendee-{}.pdf", UNSAFE_ID_CHAR.replace_all(id.trim(), "_"))
}

/// Pair each record with the id of an earlier record that already owns its
/// output file, if any. Records with an empty id claim nothing.
fn claim_outputs(records: Vec<AttendeeRecord>) -> Vec<(AttendeeRecord, Option<String>)> {
    let mut owners: HashMap<String, String> = HashMap::new();
    records
        .into_iter()
        .map(|record| {
            let id = record.id.trim();
            let earlier = if id.is_empty() {
                None
            } else {
                match owners.entry(output_file_name(id)) {
                    Entry::Occupied(owner) => Some(owner.get().clone()),
                    Entry::Vacant(slot) => {
                        slot.insert(id.to_string());
                        None
                    }
                }
            };
            (record, earlier)
        })
        .collect()
}

/// An output counts as finished when it exists and starts with `%PDF`.
/// Outputs are written atomically, so a truncated file cannot carry the
/// header of a completed badge.
fn is_finished_badge(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| &magic == b"%PDF")
        .unwrap_or(false)
}

/// Run a generation job to completion on the current task.
///
/// The job moves `pending → running → completed | failed`. Counters and the
/// snapshot stay pollable through the handle (or its [`JobStore`]) while the
/// batch runs.
///
/// # Returns
/// `Ok(GenerationSummary)` when every record was attempted and the archive
/// was written, even if some records failed (check `summary.job.failed`).
///
/// # Errors
/// * [`BadgeError::Pipeline`]: no templates, the job was not pending, or it
///   was cancelled while running.
/// * [`BadgeError::OutputWriteFailed`]: the output directory cannot be created.
/// * [`BadgeError::Archive`]: the archive step failed.
pub async fn run_job(
    handle: &Arc<JobHandle>,
    request: GenerationRequest,
    config: &GenerationConfig,
) -> Result<GenerationSummary, BadgeError> {
    let total_start = Instant::now();
    let total = request.records.len();
    info!("Job {}: starting, {} records", handle.id(), total);

    // ── Step 1: Pipeline preconditions ───────────────────────────────────
    if request.templates.is_empty() {
        let err = BadgeError::Pipeline("no badge templates configured".to_string());
        handle.mark_failed(err.to_string());
        return Err(err);
    }
    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        let err = BadgeError::OutputWriteFailed {
            path: config.output_dir.clone(),
            source: e,
        };
        handle.mark_failed(err.to_string());
        return Err(err);
    }
    if !handle.mark_running() {
        return Err(BadgeError::Pipeline(format!(
            "job {} is {}, not pending",
            handle.id(),
            handle.status()
        )));
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_job_start(handle.id(), total);
    }

    let batch = Arc::new(Batch {
        templates: request.templates,
        placements: request.placements,
        labels: config.role_labels.clone(),
        output_dir: config.output_dir.clone(),
        incremental: config.incremental,
        source: config.qr_source.source(config.style.clone()),
        text: config.text.clone(),
    });

    // ── Step 2: Claim output files ───────────────────────────────────────
    let claimed = claim_outputs(request.records);

    // ── Step 3: Fan out over records ─────────────────────────────────────
    let mut results: Vec<(usize, RecordResult)> = stream::iter(claimed.into_iter().enumerate().map(
        |(idx, (record, earlier))| {
            let batch = Arc::clone(&batch);
            let handle = Arc::clone(handle);
            let callback = config.progress_callback.clone();
            async move {
                if handle.is_terminal() {
                    debug!("Job {}: not starting record {} after cancellation", handle.id(), record.id);
                    return None;
                }
                if let Some(ref cb) = callback {
                    cb.on_record_start(&record.id);
                }
                let started = Instant::now();
                let role = batch.labels.resolve(&record.ticket_type);
                let id = record.id.clone();
                let processed = match earlier {
                    Some(first) => Err(RecordError::DuplicateId {
                        id: id.trim().to_string(),
                        file: output_file_name(&id),
                        first,
                    }),
                    None => {
                        let worker = Arc::clone(&batch);
                        tokio::task::spawn_blocking(move || worker.process(&record, role))
                            .await
                            .unwrap_or_else(|e| {
                                Err(RecordError::TaskPanicked {
                                    id: id.clone(),
                                    detail: e.to_string(),
                                })
                            })
                    }
                };

                let (outcome, path, error) = match processed {
                    Ok((outcome, path)) => (outcome, Some(path), None),
                    Err(e) => {
                        warn!("Job {}: {}", handle.id(), e);
                        (RecordOutcome::Failed, None, Some(e))
                    }
                };
                if !handle.record(outcome, role) {
                    return None;
                }
                if let Some(ref cb) = callback {
                    match &error {
                        None => cb.on_record_complete(&id, role, outcome),
                        Some(e) => cb.on_record_error(e),
                    }
                }
                Some((
                    idx,
                    RecordResult {
                        id,
                        role,
                        outcome,
                        path,
                        error,
                        duration_ms: started.elapsed().as_millis() as u64,
                    },
                ))
            }
        },
    ))
    .buffer_unordered(config.concurrency.max(1))
    .filter_map(|r| async move { r })
    .collect()
    .await;
    results.sort_by_key(|(idx, _)| *idx);
    let records: Vec<RecordResult> = results.into_iter().map(|(_, r)| r).collect();

    // ── Step 4: Cancelled while running? ─────────────────────────────────
    if handle.is_terminal() {
        let job = handle.snapshot();
        finish_callbacks(config, &job);
        return Err(BadgeError::Pipeline(format!(
            "job {} stopped: {}",
            job.id,
            job.error.unwrap_or_else(|| job.status.to_string())
        )));
    }

    // ── Step 5: Archive ──────────────────────────────────────────────────
    let mut files: Vec<PathBuf> = records
        .iter()
        .filter(|r| r.outcome != RecordOutcome::Failed)
        .filter_map(|r| r.path.clone())
        .collect();
    files.sort();
    files.dedup();
    let archiver: Arc<dyn Archiver> = config.archiver.clone().unwrap_or_else(|| Arc::new(ZipArchiver));
    let output_dir = config.output_dir.clone();
    let archived = tokio::task::spawn_blocking(move || archiver.archive(&files, &output_dir))
        .await
        .unwrap_or_else(|e| Err(BadgeError::Internal(format!("archive task aborted: {e}"))));

    let archive = match archived {
        Ok(path) => path,
        Err(e) => {
            warn!("Job {}: archive step failed: {}", handle.id(), e);
            handle.mark_failed(e.to_string());
            finish_callbacks(config, &handle.snapshot());
            return Err(e);
        }
    };

    // ── Step 6: Complete ─────────────────────────────────────────────────
    if !handle.mark_completed(Some(archive)) {
        let job = handle.snapshot();
        finish_callbacks(config, &job);
        return Err(BadgeError::Pipeline(format!("job {} was {} before completion", job.id, job.status)));
    }
    let job = handle.snapshot();
    finish_callbacks(config, &job);

    let total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Job {}: completed, {} generated / {} skipped / {} failed in {}ms",
        job.id, job.generated, job.skipped, job.failed, total_duration_ms
    );
    Ok(GenerationSummary {
        job,
        records,
        total_duration_ms,
    })
}

fn finish_callbacks(config: &GenerationConfig, job: &crate::job::GenerationJob) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_job_complete(job.generated, job.skipped, job.failed);
    }
}

/// Register a job in `store` and run it on a Tokio task.
///
/// Returns immediately; poll [`JobStore::status`] with the handle's id.
/// Must be called from within a Tokio runtime.
pub fn spawn_job(store: &JobStore, request: GenerationRequest, config: GenerationConfig) -> Arc<JobHandle> {
    let handle = store.create_job(request.records.len());
    let task_handle = Arc::clone(&handle);
    tokio::spawn(async move {
        if let Err(e) = run_job(&task_handle, request, &config).await {
            warn!("Job {} failed: {}", task_handle.id(), e);
        }
    });
    handle
}
