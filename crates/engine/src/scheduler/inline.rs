use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::gate::CooldownGate;
use crate::metrics::EngineMetrics;
use crate::sweeper::{SweepOptions, Sweeper};

/// Settings for request-triggered cleanup.
#[derive(Debug, Clone)]
pub struct InlineConfig {
    pub enabled: bool,
    /// Minimum time between two request-triggered sweeps.
    pub cooldown: Duration,
    /// Orphan deletions allowed per inline sweep.
    pub orphan_cap: usize,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown: Duration::from_secs(300),
            orphan_cap: 10,
        }
    }
}

/// Fire-and-forget sweeps launched from the request path.
///
/// Triggers never block the caller. A trigger that finds a sweep in flight
/// (or the cooldown still running) is skipped.
pub struct InlineCleanupTrigger {
    sweeper: Arc<Sweeper>,
    gate: Arc<CooldownGate>,
    config: InlineConfig,
    metrics: Arc<EngineMetrics>,
    tracker: TaskTracker,
}

/// Releases the gate when the spawned sweep ends, even on panic.
struct GateRelease(Arc<CooldownGate>);

impl Drop for GateRelease {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl InlineCleanupTrigger {
    pub fn new(sweeper: Arc<Sweeper>, config: InlineConfig, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            sweeper,
            gate: Arc::new(CooldownGate::new(config.cooldown)),
            config,
            metrics,
            tracker: TaskTracker::new(),
        }
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    /// Start a capped sweep if the cooldown has elapsed and none is running.
    ///
    /// Returns whether a sweep was started.
    pub fn maybe_trigger(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        if !self.gate.try_acquire() {
            self.skip("cooldown or sweep in flight");
            return false;
        }
        self.spawn_sweep();
        true
    }

    /// Start a capped sweep unless one is already running.
    ///
    /// Used after a completed download so the freshly consumed record is
    /// reclaimed without waiting for the cooldown.
    pub fn trigger_after_download(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        if !self.gate.try_acquire_ignoring_cooldown() {
            self.skip("sweep in flight");
            return false;
        }
        self.spawn_sweep();
        true
    }

    /// Wait for in-flight sweeps to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        info!("inline cleanup stopped");
    }

    fn skip(&self, reason: &'static str) {
        self.metrics.increment_inline_skipped();
        debug!(reason, "inline cleanup skipped");
    }

    fn spawn_sweep(&self) {
        let release = GateRelease(Arc::clone(&self.gate));
        let sweeper = Arc::clone(&self.sweeper);
        let options = SweepOptions::inline(self.config.orphan_cap);

        self.tracker.spawn(async move {
            let _release = release;
            match sweeper.run(options).await {
                Ok(report) => debug!(
                    records_deleted = report.expiry.records_deleted,
                    orphans_deleted = report.orphans.orphans_deleted,
                    "inline cleanup finished"
                ),
                Err(e) => warn!(error = %e, "inline cleanup failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use ferry_blob::BlobStore;
    use ferry_store::MetadataStore;

    use super::*;
    use crate::test_support::Harness;

    fn trigger(h: &Harness, config: InlineConfig) -> InlineCleanupTrigger {
        InlineCleanupTrigger::new(Arc::clone(&h.sweeper), config, Arc::clone(&h.metrics))
    }

    #[tokio::test]
    async fn trigger_reclaims_expired_records() {
        let h = Harness::new();
        h.upload_and_download("a.txt").await;
        h.clock.advance(Duration::from_secs(61));

        let inline = trigger(&h, InlineConfig::default());
        assert!(inline.maybe_trigger());
        inline.shutdown().await;

        assert_eq!(h.store.count().await.unwrap(), 0);
        assert!(!inline.gate().is_in_flight());
        assert_eq!(h.metrics.snapshot().sweeps_run, 1);
    }

    #[tokio::test]
    async fn cooldown_skips_middleware_triggers_but_not_downloads() {
        let h = Harness::new();
        let inline = trigger(&h, InlineConfig::default());

        assert!(inline.maybe_trigger());
        inline.shutdown().await;

        assert!(!inline.maybe_trigger());
        assert_eq!(h.metrics.snapshot().inline_skipped, 1);

        assert!(inline.trigger_after_download());
        inline.shutdown().await;
    }

    #[tokio::test]
    async fn disabled_trigger_never_spawns() {
        let h = Harness::new();
        let inline = trigger(
            &h,
            InlineConfig {
                enabled: false,
                ..InlineConfig::default()
            },
        );
        assert!(!inline.maybe_trigger());
        assert!(!inline.trigger_after_download());
        assert_eq!(h.metrics.snapshot().inline_skipped, 0);
    }

    #[tokio::test]
    async fn inline_sweep_caps_orphan_removal() {
        let h = Harness::new();
        for i in 0..4 {
            h.plant_orphan(&format!("uploads/o{i}.bin")).await;
        }
        h.clock.advance(Duration::from_secs(120));

        let inline = trigger(
            &h,
            InlineConfig {
                orphan_cap: 3,
                ..InlineConfig::default()
            },
        );
        assert!(inline.trigger_after_download());
        inline.shutdown().await;

        assert_eq!(h.blobs.list("uploads").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failures_release_the_gate() {
        let h = Harness::new();
        h.store.fail_queries.store(true, Ordering::SeqCst);
        let inline = trigger(
            &h,
            InlineConfig {
                cooldown: Duration::ZERO,
                ..InlineConfig::default()
            },
        );

        assert!(inline.maybe_trigger());
        inline.shutdown().await;

        assert_eq!(h.metrics.snapshot().sweep_failures, 1);
        assert!(!inline.gate().is_in_flight());
        assert!(inline.maybe_trigger());
        inline.shutdown().await;
    }
}
