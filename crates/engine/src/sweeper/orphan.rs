use chrono::Duration as ChronoDuration;
use tracing::{debug, info, instrument, warn};

use super::{OrphanReport, SweepOptions, Sweeper};
use crate::error::SweepError;

impl Sweeper {
    /// Remove blobs under the upload prefix that no record references.
    ///
    /// Referenced paths are read before the blob listing, so a blob written
    /// by an upload that commits mid-pass shows up as unreferenced. The
    /// grace window covers that case: blobs modified less than
    /// `orphan_grace` ago are skipped. Once `options.orphan_cap` deletions
    /// have been made the remaining orphans are counted as deferred.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError`] if the referenced paths cannot be read or the
    /// blob listing fails.
    #[instrument(name = "sweeper.orphan_pass", skip(self), fields(dry_run = options.dry_run))]
    pub async fn orphan_pass(&self, options: SweepOptions) -> Result<OrphanReport, SweepError> {
        let referenced = self.store.storage_paths().await?;
        let entries = self.blobs.list(&self.config.upload_prefix).await?;

        let now = self.clock.now();
        let grace = ChronoDuration::from_std(self.config.orphan_grace).unwrap_or(ChronoDuration::MAX);
        let cap = options.orphan_cap.unwrap_or(usize::MAX);

        let mut report = OrphanReport {
            scanned: entries.len() as u64,
            ..OrphanReport::default()
        };
        let mut handled = 0usize;

        for entry in entries {
            if referenced.contains(&entry.path) {
                continue;
            }
            if now.signed_duration_since(entry.modified_at) < grace {
                report.skipped_recent += 1;
                continue;
            }
            report.orphans_found += 1;

            if handled >= cap {
                report.deferred += 1;
                continue;
            }
            handled += 1;

            if options.dry_run {
                info!(path = %entry.path, size = entry.size, "would delete orphan");
                report.orphans_deleted += 1;
                report.removed.push(entry.path);
                continue;
            }

            match self.blobs.delete(&entry.path).await {
                Ok(true) => {
                    debug!(path = %entry.path, "orphan removed");
                    report.orphans_deleted += 1;
                    report.removed.push(entry.path);
                }
                Ok(false) => debug!(path = %entry.path, "orphan already gone"),
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "orphan delete failed");
                    report.errors.push(format!("{}: {e}", entry.path));
                }
            }
        }

        if report.deferred > 0 {
            debug!(deferred = report.deferred, "orphan cap reached");
        }
        Ok(report)
    }
}
