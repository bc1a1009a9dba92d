use chrono::{DateTime, Utc};
use serde::Serialize;

/// Error messages kept per pass. Anything beyond is only counted.
pub const MAX_REPORTED_ERRORS: usize = 100;

/// Bounded list of per-item failure messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorLog {
    pub messages: Vec<String>,
    /// Failures that happened after the list was full.
    pub truncated: u64,
}

impl ErrorLog {
    pub(crate) fn push(&mut self, message: String) {
        if self.messages.len() < MAX_REPORTED_ERRORS {
            self.messages.push(message);
        } else {
            self.truncated += 1;
        }
    }

    /// Total failures seen, kept or not.
    pub fn total(&self) -> u64 {
        self.messages.len() as u64 + self.truncated
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Outcome of one expiry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    /// Records selected for reclamation.
    pub candidates: u64,
    /// Records removed (or that would be, in a dry run).
    pub records_deleted: u64,
    /// Blobs removed (or that would be, in a dry run).
    pub blobs_deleted: u64,
    /// Candidates whose blob was already gone.
    pub blobs_missing: u64,
    /// Codes of the records reclaimed.
    pub reclaimed: Vec<String>,
    pub errors: ErrorLog,
}

/// Outcome of one orphan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    /// Blobs listed under the managed prefix.
    pub scanned: u64,
    /// Unreferenced blobs old enough to be removed.
    pub orphans_found: u64,
    /// Orphans removed (or that would be, in a dry run).
    pub orphans_deleted: u64,
    /// Unreferenced blobs left alone because they are inside the grace window.
    pub skipped_recent: u64,
    /// Orphans left for a later pass because the cap was reached.
    pub deferred: u64,
    /// Paths of the orphans removed.
    pub removed: Vec<String>,
    pub errors: ErrorLog,
}

/// Combined outcome of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub force: bool,
    pub expiry: ExpiryReport,
    pub orphans: OrphanReport,
}

impl SweepReport {
    /// Per-item failures across both passes.
    pub fn error_count(&self) -> u64 {
        self.expiry.errors.total() + self.orphans.errors.total()
    }
}
