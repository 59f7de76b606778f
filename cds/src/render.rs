//! Terminal output for run summaries and job listings

use batchsync::BatchOutcome;
use colored::*;
use std::fmt::Write;

use crate::config::{Config, DestinationConfig};
use crate::runner::{JobReport, RunSummary};

/// Failed batches and skipped records listed per job before eliding the rest
const MAX_LISTED: usize = 10;

pub fn render_job(job: &JobReport) -> String {
    let report = &job.report;
    let totals = &report.totals;
    let mut out = String::new();

    let mark = if report.is_clean() {
        "✓".green()
    } else if totals.batches_failed > 0 {
        "✗".red()
    } else {
        "!".yellow()
    };
    let _ = write!(
        out,
        "{} {} → {}  {} records in {} batches ({} ok, {} failed, {} skipped)",
        mark,
        job.job.cyan(),
        report.table,
        totals.attempted,
        report.batches.len(),
        totals.succeeded.to_string().green(),
        totals.failed.to_string().red(),
        totals.transform_failed.to_string().yellow(),
    );
    if report.dry_run {
        let _ = write!(out, " {}", "[dry run]".dimmed());
    }
    if report.cancelled {
        let _ = write!(
            out,
            " {}",
            format!("cancelled after {} of {} batches", report.batches.len(), report.batches_planned).yellow()
        );
    }

    let failures = report.batches.iter().filter_map(|b| match &b.outcome {
        BatchOutcome::Failure { reason } => Some((b.batch_index, b.record_count, reason)),
        BatchOutcome::Success { .. } => None,
    });
    for (index, count, reason) in failures.clone().take(MAX_LISTED) {
        let _ = write!(out, "\n    batch {} ({} records): {}", index, count, reason.red());
    }
    let failed = failures.count();
    if failed > MAX_LISTED {
        let _ = write!(out, "\n    ... {} more failed batches", failed - MAX_LISTED);
    }

    for failure in report.transform_errors.iter().take(MAX_LISTED) {
        let _ = write!(
            out,
            "\n    record {}: {}",
            failure.record_index,
            failure.reason.yellow()
        );
    }
    if report.transform_errors.len() > MAX_LISTED {
        let _ = write!(
            out,
            "\n    ... {} more skipped records",
            report.transform_errors.len() - MAX_LISTED
        );
    }

    out
}

pub fn render_summary(summary: &RunSummary) -> String {
    let mut lines: Vec<String> = summary.jobs.iter().map(render_job).collect();
    if let Some(reason) = &summary.aborted {
        lines.push(format!("{} {}", "✗".red(), reason.red()));
    }
    if lines.is_empty() {
        return "No jobs ran".to_string();
    }

    let failed: usize = summary.jobs.iter().map(|j| j.report.failed_batches().len()).sum();
    if failed > 0 {
        lines.push(format!(
            "{} {} failed batches; rerun them with {}",
            "→".dimmed(),
            failed,
            "cds run --retry-from <report>".bold()
        ));
    }
    lines.join("\n")
}

pub fn render_jobs(config: &Config) -> String {
    if config.jobs.is_empty() {
        return "No jobs configured".to_string();
    }

    let destination = match &config.destination {
        DestinationConfig::Sqlite { path } => format!("sqlite {}", path.display()),
        DestinationConfig::Postgrest(pg) => format!("postgrest {}", pg.base_url),
    };

    let mut lines = vec![format!("Destination: {}", destination.cyan())];
    for job in &config.jobs {
        let batch_size = job.batch_size.unwrap_or(config.defaults.batch_size);
        lines.push(format!(
            "  {}  {}:{} → {}  key [{}]  batch {}",
            job.name.cyan(),
            job.source_path.display(),
            job.query.table,
            job.table,
            job.conflict_key.join(", "),
            batch_size
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchsync::{BatchResult, SyncReport, TransformError};

    fn job_report(failures: &[usize]) -> JobReport {
        let mut report = SyncReport::new("cards", false);
        for index in 0..3 {
            let outcome = if failures.contains(&index) {
                BatchOutcome::Failure {
                    reason: "Destination rejected batch (409): conflict".to_string(),
                }
            } else {
                BatchOutcome::Success { simulated: false }
            };
            report.push_batch(BatchResult {
                batch_index: index,
                record_count: 10,
                duplicates_dropped: 0,
                attempts: 1,
                outcome,
            });
        }
        report.batches_planned = 3;
        report.finish(false);
        JobReport {
            job: "cards".to_string(),
            batch_size: 10,
            report,
        }
    }

    #[test]
    fn test_render_clean_job() {
        let out = render_job(&job_report(&[]));
        assert!(out.contains("30 records in 3 batches"));
        assert!(!out.contains("batch 0"));
    }

    #[test]
    fn test_render_lists_failures() {
        let mut job = job_report(&[1]);
        job.report
            .push_transform_error(4, &TransformError::MissingField("name".to_string()));

        let out = render_job(&job);
        assert!(out.contains("batch 1 (10 records)"));
        assert!(out.contains("409"));
        assert!(out.contains("record 4"));
    }

    #[test]
    fn test_summary_points_at_retry() {
        let summary = RunSummary {
            started_at: chrono::Utc::now(),
            finished_at: None,
            dry_run: false,
            lang: None,
            limit: None,
            jobs: vec![job_report(&[0, 2])],
            aborted: None,
        };
        let out = render_summary(&summary);
        assert!(out.contains("2 failed batches"));
        assert!(out.contains("--retry-from"));
    }

    #[test]
    fn test_summary_shows_abort_after_finished_jobs() {
        let summary = RunSummary {
            started_at: chrono::Utc::now(),
            finished_at: None,
            dry_run: false,
            lang: None,
            limit: None,
            jobs: vec![job_report(&[])],
            aborted: Some("Job prices aborted: Source read error".to_string()),
        };
        let out = render_summary(&summary);
        assert!(out.contains("30 records in 3 batches"));
        assert!(out.contains("Job prices aborted"));
    }

    #[test]
    fn test_render_jobs_empty() {
        assert_eq!(render_jobs(&Config::default()), "No jobs configured");
    }
}
