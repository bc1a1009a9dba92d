use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking lifecycle and cleanup activity.
///
/// All counters use relaxed ordering. For a point-in-time view, call
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Files accepted by `create_record`.
    pub uploads: AtomicU64,
    /// Download tokens issued by info lookups.
    pub tokens_issued: AtomicU64,
    /// Completed single-use downloads.
    pub downloads: AtomicU64,
    /// Sweeps that ran to completion (any trigger, dry runs excluded).
    pub sweeps_run: AtomicU64,
    /// Sweeps that aborted with an engine-level error.
    pub sweep_failures: AtomicU64,
    /// Records reclaimed by the expiry pass.
    pub records_reaped: AtomicU64,
    /// Orphan blobs removed by the orphan pass.
    pub orphans_removed: AtomicU64,
    /// Per-record errors collected during sweeps.
    pub sweep_errors: AtomicU64,
    /// Inline triggers skipped by the cooldown gate.
    pub inline_skipped: AtomicU64,
}

impl EngineMetrics {
    pub fn increment_uploads(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_tokens_issued(&self) {
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_downloads(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sweeps_run(&self) {
        self.sweeps_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sweep_failures(&self) {
        self.sweep_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_records_reaped(&self, n: u64) {
        self.records_reaped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_orphans_removed(&self, n: u64) {
        self.orphans_removed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_sweep_errors(&self, n: u64) {
        self.sweep_errors.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_inline_skipped(&self) {
        self.inline_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads: self.uploads.load(Ordering::Relaxed),
            tokens_issued: self.tokens_issued.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            sweeps_run: self.sweeps_run.load(Ordering::Relaxed),
            sweep_failures: self.sweep_failures.load(Ordering::Relaxed),
            records_reaped: self.records_reaped.load(Ordering::Relaxed),
            orphans_removed: self.orphans_removed.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
            inline_skipped: self.inline_skipped.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads: u64,
    pub tokens_issued: u64,
    pub downloads: u64,
    pub sweeps_run: u64,
    pub sweep_failures: u64,
    pub records_reaped: u64,
    pub orphans_removed: u64,
    pub sweep_errors: u64,
    pub inline_skipped: u64,
}
