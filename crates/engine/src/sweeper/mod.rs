//! Reconciliation between the metadata store and the blob store.
//!
//! A sweep runs two passes:
//! - the expiry pass reclaims records past their retention window (or, in
//!   force mode, every downloaded record) together with their blobs;
//! - the orphan pass removes blobs under the managed prefix that no record
//!   references.
//!
//! Per-item failures are collected in the report and never abort a pass.

mod expiry;
mod orphan;
mod report;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument};

use ferry_blob::BlobStore;
use ferry_core::Clock;
use ferry_store::MetadataStore;

use crate::error::SweepError;
use crate::lifecycle::LifecycleEngine;
use crate::metrics::EngineMetrics;

pub use report::{ErrorLog, ExpiryReport, MAX_REPORTED_ERRORS, OrphanReport, SweepReport};

/// Per-invocation switches. The three trigger modes differ only here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOptions {
    /// Report what would be removed without removing anything.
    pub dry_run: bool,
    /// Reclaim every downloaded record, ignoring `expires_at`.
    pub force: bool,
    /// Upper bound on orphan deletions in this run.
    pub orphan_cap: Option<usize>,
}

impl SweepOptions {
    /// Full, uncapped sweep on the periodic cadence.
    pub fn periodic() -> Self {
        Self::default()
    }

    /// Request-triggered sweep with a capped orphan pass.
    pub fn inline(orphan_cap: usize) -> Self {
        Self {
            orphan_cap: Some(orphan_cap),
            ..Self::default()
        }
    }

    /// Operator-invoked sweep.
    pub fn manual(dry_run: bool, force: bool) -> Self {
        Self {
            dry_run,
            force,
            orphan_cap: None,
        }
    }
}

/// Static sweeper settings.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Blob prefix scanned by the orphan pass.
    pub upload_prefix: String,
    /// Unreferenced blobs younger than this are left alone.
    pub orphan_grace: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            upload_prefix: String::from("uploads"),
            orphan_grace: Duration::from_secs(60),
        }
    }
}

/// Garbage collector for expired records and orphaned blobs.
pub struct Sweeper {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
    metrics: Arc<EngineMetrics>,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        config: SweeperConfig,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            blobs,
            clock,
            config,
            metrics,
        }
    }

    /// Build a sweeper sharing the engine's stores, clock and metrics.
    ///
    /// The orphan pass scans the engine's upload prefix regardless of
    /// `config.upload_prefix`.
    pub fn from_engine(engine: &LifecycleEngine, config: SweeperConfig) -> Self {
        Self {
            store: Arc::clone(&engine.store),
            blobs: Arc::clone(&engine.blobs),
            clock: Arc::clone(&engine.clock),
            config: SweeperConfig {
                upload_prefix: engine.config.upload_prefix.clone(),
                ..config
            },
            metrics: Arc::clone(&engine.metrics),
        }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Run the expiry pass followed by the orphan pass.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError`] only when a pass cannot start: the candidate
    /// query, the referenced-path query, or the blob listing failed.
    #[instrument(
        name = "sweeper.run",
        skip(self),
        fields(dry_run = options.dry_run, force = options.force)
    )]
    pub async fn run(&self, options: SweepOptions) -> Result<SweepReport, SweepError> {
        let started_at = self.clock.now();

        let expiry = match self.expiry_pass(options).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e)),
        };
        if !options.dry_run {
            self.metrics.add_records_reaped(expiry.records_deleted);
        }

        let orphans = match self.orphan_pass(options).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e)),
        };
        if !options.dry_run {
            self.metrics.add_orphans_removed(orphans.orphans_deleted);
            self.metrics.increment_sweeps_run();
        }

        let report = SweepReport {
            started_at,
            finished_at: self.clock.now(),
            dry_run: options.dry_run,
            force: options.force,
            expiry,
            orphans,
        };
        self.metrics.add_sweep_errors(report.error_count());

        info!(
            records_deleted = report.expiry.records_deleted,
            blobs_missing = report.expiry.blobs_missing,
            orphans_deleted = report.orphans.orphans_deleted,
            errors = report.error_count(),
            "sweep finished"
        );
        Ok(report)
    }

    fn fail(&self, e: SweepError) -> SweepError {
        self.metrics.increment_sweep_failures();
        error!(error = %e, "sweep aborted");
        e
    }
}
