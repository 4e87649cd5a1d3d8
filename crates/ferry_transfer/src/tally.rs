//! Run counters and the end-of-run report.

use crate::transfer::TransferState;
use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

/// Counters for one run. Only the orchestrator mutates them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferTally {
    /// Distinct candidate records found in the source.
    pub records_seen: usize,
    /// Records the destination reported as imported.
    pub records_imported: usize,
    /// Records the source reported as deleted. Informational only.
    pub records_deleted: usize,
    /// Rows (instances) that failed validation.
    pub instances_rejected: usize,
    /// Batches whose export or import produced no result.
    pub batches_failed: usize,
}

impl TransferTally {
    /// Records not imported, for validation or import reasons.
    ///
    /// Derived from the candidate count; deletions play no part.
    pub fn records_failed(&self) -> usize {
        self.records_seen.saturating_sub(self.records_imported)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub run_id: Uuid,
    pub state: TransferState,
    pub tally: TransferTally,
    /// Whether only part of the project was validated (deletion disabled).
    pub subset: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl TransferReport {
    pub fn records_failed(&self) -> usize {
        self.tally.records_failed()
    }
}
