//! Result types returned by a generation run.

use crate::error::RecordError;
use crate::job::GenerationJob;
use crate::model::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How one record ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// A badge was composed and written in this run.
    Generated,
    /// Incremental mode found a finished badge from an earlier run.
    Skipped,
    Failed,
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordOutcome::Generated => write!(f, "generated"),
            RecordOutcome::Skipped => write!(f, "skipped"),
            RecordOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Per-record result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResult {
    pub id: String,
    pub role: Role,
    pub outcome: RecordOutcome,
    /// Badge file; present for generated and skipped records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordError>,
    pub duration_ms: u64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    /// Final job snapshot (status, counters, timestamps, archive).
    pub job: GenerationJob,
    /// One entry per input record, in input order.
    pub records: Vec<RecordResult>,
    pub total_duration_ms: u64,
}

impl GenerationSummary {
    pub fn failures(&self) -> impl Iterator<Item = &RecordResult> {
        self.records.iter().filter(|r| r.outcome == RecordOutcome::Failed)
    }

    pub fn archive(&self) -> Option<&PathBuf> {
        self.job.archive.as_ref()
    }
}
