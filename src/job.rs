//! Job state machine and the in-process job registry.
//!
//! ```text
//! pending ──mark_running──▶ running ──mark_completed──▶ completed
//!    │                         │
//!    └──────mark_failed────────┴──────mark_failed─────▶ failed
//! ```
//!
//! Terminal states are final. Late transitions and record completions that
//! arrive after a job was cancelled are ignored and logged, so a polled
//! snapshot never moves backwards.

use crate::error::BadgeError;
use crate::model::Role;
use crate::output::RecordOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Generation job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, no record processed yet.
    Pending,
    Running,
    /// Every record attempted and the archive written.
    Completed,
    /// Pipeline-level failure or cancellation.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Serialisable snapshot of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: String,
    pub status: JobStatus,
    pub total_records: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Generated badges per role.
    pub role_counts: BTreeMap<Role, usize>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
}

impl GenerationJob {
    fn new(total_records: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            total_records,
            generated: 0,
            skipped: 0,
            failed: 0,
            role_counts: BTreeMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            archive: None,
        }
    }

    /// Records with an outcome so far.
    pub fn processed(&self) -> usize {
        self.generated + self.skipped + self.failed
    }
}

/// Shared, mutable handle on one job. All updates go through its mutex.
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    state: Mutex<GenerationJob>,
}

impl JobHandle {
    pub fn new(total_records: usize) -> Self {
        let job = GenerationJob::new(total_records);
        Self {
            id: job.id.clone(),
            state: Mutex::new(job),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, GenerationJob> {
        // A panic while holding the guard cannot leave counters half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> GenerationJob {
        self.lock().clone()
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// `pending → running`. Returns false when the job had already moved on.
    pub fn mark_running(&self) -> bool {
        let mut job = self.lock();
        if job.status != JobStatus::Pending {
            warn!("Job {}: ignoring start, status is already {}", job.id, job.status);
            return false;
        }
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        true
    }

    /// Count one record outcome. Ignored once the job is terminal.
    pub fn record(&self, outcome: RecordOutcome, role: Role) -> bool {
        let mut job = self.lock();
        if job.status.is_terminal() {
            debug!("Job {}: discarding {outcome} result after {}", job.id, job.status);
            return false;
        }
        match outcome {
            RecordOutcome::Generated => {
                job.generated += 1;
                *job.role_counts.entry(role).or_insert(0) += 1;
            }
            RecordOutcome::Skipped => job.skipped += 1,
            RecordOutcome::Failed => job.failed += 1,
        }
        true
    }

    /// `running → completed`.
    pub fn mark_completed(&self, archive: Option<PathBuf>) -> bool {
        let mut job = self.lock();
        if job.status != JobStatus::Running {
            warn!("Job {}: ignoring completion, status is {}", job.id, job.status);
            return false;
        }
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.archive = archive;
        true
    }

    /// `pending | running → failed`.
    pub fn mark_failed(&self, error: impl Into<String>) -> bool {
        let mut job = self.lock();
        let error = error.into();
        if job.status.is_terminal() {
            warn!("Job {}: ignoring failure '{error}', status is {}", job.id, job.status);
            return false;
        }
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error = Some(error);
        true
    }
}

/// In-process registry of jobs, keyed by id, for status polling.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<JobHandle>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `pending` job.
    pub fn create_job(&self, total_records: usize) -> Arc<JobHandle> {
        let handle = Arc::new(JobHandle::new(total_records));
        self.jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(handle.id().to_string(), Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: &str) -> Option<Arc<JobHandle>> {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    /// Current snapshot of a job.
    pub fn status(&self, id: &str) -> Option<GenerationJob> {
        self.get(id).map(|h| h.snapshot())
    }

    /// Fail a job from outside. Records not yet started are not processed
    /// and completions that arrive afterwards are discarded.
    pub fn cancel(&self, id: &str, reason: &str) -> Result<GenerationJob, BadgeError> {
        let handle = self.get(id).ok_or_else(|| BadgeError::JobNotFound(id.to_string()))?;
        handle.mark_failed(format!("cancelled: {reason}"));
        Ok(handle.snapshot())
    }

    /// Snapshots of all jobs, newest first.
    pub fn list(&self) -> Vec<GenerationJob> {
        let mut jobs: Vec<GenerationJob> = self
            .jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(|h| h.snapshot())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!(JobStatus::Completed.to_string(), "completed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn new_job_is_pending_with_uuid() {
        let handle = JobHandle::new(7);
        let job = handle.snapshot();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_records, 7);
        assert!(Uuid::parse_str(&job.id).is_ok());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn happy_path_transitions() {
        let handle = JobHandle::new(3);
        assert!(handle.mark_running());
        assert!(handle.record(RecordOutcome::Generated, Role::Staff));
        assert!(handle.record(RecordOutcome::Skipped, Role::Attendee));
        assert!(handle.record(RecordOutcome::Failed, Role::Attendee));
        assert!(handle.mark_completed(Some(PathBuf::from("badges.zip"))));

        let job = handle.snapshot();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.generated, job.skipped, job.failed), (1, 1, 1));
        assert_eq!(job.processed(), job.total_records);
        assert_eq!(job.role_counts.get(&Role::Staff), Some(&1));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn terminal_states_are_final() {
        let handle = JobHandle::new(1);
        handle.mark_running();
        assert!(handle.mark_failed("boom"));
        assert!(!handle.mark_completed(None));
        assert!(!handle.mark_running());
        assert!(!handle.record(RecordOutcome::Generated, Role::Attendee));
        assert!(!handle.mark_failed("again"));

        let job = handle.snapshot();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.generated, 0);
    }

    #[test]
    fn completion_requires_running() {
        let handle = JobHandle::new(0);
        assert!(!handle.mark_completed(None));
        assert_eq!(handle.status(), JobStatus::Pending);
    }

    #[test]
    fn store_cancel_and_lookup() {
        let store = JobStore::new();
        let handle = store.create_job(2);
        handle.mark_running();

        let job = store.cancel(handle.id(), "operator request").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("operator request"));
        assert_eq!(store.status(handle.id()).unwrap().status, JobStatus::Failed);

        assert!(matches!(store.cancel("nope", "x"), Err(BadgeError::JobNotFound(_))));
        assert!(store.status("nope").is_none());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn snapshot_serialises_snake_case() {
        let handle = JobHandle::new(1);
        let json = serde_json::to_value(handle.snapshot()).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("archive").is_none());
    }
}
