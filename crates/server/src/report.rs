//! Operator-facing rendering of sweep reports.

use std::fmt::Write as _;

use ferry_engine::SweepReport;

/// Output format of the `cleanup` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

/// Render `report` in the requested format.
pub fn render(report: &SweepReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(render_text(report)),
        ReportFormat::Json => serde_json::to_string_pretty(report),
    }
}

/// Human-readable summary, listing every per-item failure kept.
pub fn render_text(report: &SweepReport) -> String {
    let mut out = String::new();
    let verb = if report.dry_run { "would delete" } else { "deleted" };

    if report.dry_run {
        for code in &report.expiry.reclaimed {
            let _ = writeln!(out, "would delete record {code}");
        }
        for path in &report.orphans.removed {
            let _ = writeln!(out, "would delete orphan {path}");
        }
    }

    let mode = match (report.dry_run, report.force) {
        (true, true) => " (dry run, force)",
        (true, false) => " (dry run)",
        (false, true) => " (force)",
        (false, false) => "",
    };
    let _ = writeln!(out, "Cleanup summary{mode}");
    let _ = writeln!(out, "  expired candidates:  {}", report.expiry.candidates);
    let _ = writeln!(out, "  records {verb}: {}", report.expiry.records_deleted);
    let _ = writeln!(out, "  blobs {verb}:   {}", report.expiry.blobs_deleted);
    let _ = writeln!(out, "  blobs already gone:  {}", report.expiry.blobs_missing);
    let _ = writeln!(out, "  blobs scanned:       {}", report.orphans.scanned);
    let _ = writeln!(out, "  orphans {verb}: {}", report.orphans.orphans_deleted);
    let _ = writeln!(out, "  orphans too recent:  {}", report.orphans.skipped_recent);

    let errors = report.error_count();
    let _ = writeln!(out, "  errors:              {errors}");
    for message in report
        .expiry
        .errors
        .messages
        .iter()
        .chain(&report.orphans.errors.messages)
    {
        let _ = writeln!(out, "    - {message}");
    }
    let truncated = report.expiry.errors.truncated + report.orphans.errors.truncated;
    if truncated > 0 {
        let _ = writeln!(out, "    ... and {truncated} more");
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ferry_engine::{ExpiryReport, OrphanReport};

    use super::*;

    fn report(dry_run: bool) -> SweepReport {
        let now = Utc::now();
        SweepReport {
            started_at: now,
            finished_at: now,
            dry_run,
            force: false,
            expiry: ExpiryReport {
                candidates: 2,
                records_deleted: 2,
                blobs_deleted: 1,
                blobs_missing: 1,
                reclaimed: vec!["AAAA1111".into(), "BBBB2222".into()],
                ..ExpiryReport::default()
            },
            orphans: OrphanReport {
                scanned: 3,
                orphans_found: 1,
                orphans_deleted: 1,
                removed: vec!["uploads/stray.bin".into()],
                ..OrphanReport::default()
            },
        }
    }

    #[test]
    fn dry_run_lists_candidates() {
        let text = render_text(&report(true));
        assert!(text.contains("would delete record AAAA1111"));
        assert!(text.contains("would delete orphan uploads/stray.bin"));
        assert!(text.contains("Cleanup summary (dry run)"));
    }

    #[test]
    fn live_run_prints_summary_only() {
        let text = render_text(&report(false));
        assert!(!text.contains("would delete record"));
        assert!(text.contains("records deleted: 2"));
        assert!(text.contains("errors:              0"));
    }

    #[test]
    fn errors_are_listed() {
        let mut r = report(false);
        r.expiry.errors.messages.push("AAAA1111: blob delete failed".into());
        r.orphans.errors.truncated = 4;
        let text = render_text(&r);
        assert!(text.contains("    - AAAA1111: blob delete failed"));
        assert!(text.contains("... and 4 more"));
    }

    #[test]
    fn json_format_is_machine_readable() {
        let json = render(&report(false), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["expiry"]["records_deleted"], 2);
        assert_eq!(value["orphans"]["removed"][0], "uploads/stray.bin");
    }
}
