//! Job runner
//!
//! Builds one `BatchSynchronizer` per configured job and runs the jobs one
//! after another against a shared destination. Batch and record failures end
//! up in the summary; only configuration and source-read errors abort.

use batchsync::{
    BatchSynchronizer, CancellationToken, Destination, PostgrestDestination, SqliteDestination, SqliteSource,
    SyncReport, SyncSettings,
};
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, DestinationConfig, JobConfig};

/// Command-line overrides for one `cds run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Jobs to run; empty runs all of them
    pub jobs: Vec<String>,
    pub dry_run: bool,
    pub lang: Option<String>,
    pub limit: Option<usize>,
    pub batch_size: Option<usize>,
}

/// The report of one job, plus what is needed to retry it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: String,
    pub batch_size: usize,
    pub report: SyncReport,
}

/// Everything one `cds run` did, as written by `--report`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    pub jobs: Vec<JobReport>,
    /// Why the run stopped early; jobs after the failing one did not run
    #[serde(default)]
    pub aborted: Option<String>,
}

impl RunSummary {
    fn new(options: &RunOptions) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run: options.dry_run,
            lang: options.lang.clone(),
            limit: options.limit,
            jobs: Vec::new(),
            aborted: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context(format!("Failed to read report {}", path.display()))?;
        serde_json::from_str(&content).context(format!("Failed to parse report {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).context(format!("Failed to write report {}", path.display()))?;
        Ok(())
    }

    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.job == name)
    }

    pub fn cancelled(&self) -> bool {
        self.jobs.iter().any(|j| j.report.cancelled)
    }
}

pub fn build_destination(config: &DestinationConfig) -> Arc<dyn Destination> {
    match config {
        DestinationConfig::Sqlite { path } => Arc::new(SqliteDestination::new(path)),
        DestinationConfig::Postgrest(pg) => Arc::new(PostgrestDestination::new(pg.clone())),
    }
}

/// Resolve job names; no names selects every job
pub fn select_jobs<'a>(config: &'a Config, names: &[String]) -> Result<Vec<&'a JobConfig>> {
    if names.is_empty() {
        return Ok(config.jobs.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            config
                .job(name)
                .ok_or_else(|| eyre::eyre!("Unknown job {}", name))
        })
        .collect()
}

/// Build the synchronizer for one job with the run's overrides applied
pub fn build_job(
    config: &Config,
    job: &JobConfig,
    options: &RunOptions,
    destination: Arc<dyn Destination>,
) -> Result<BatchSynchronizer> {
    debug!(job = %job.name, ?options, "build_job: called");
    job.mapping
        .validate()
        .context(format!("Invalid mapping for job {}", job.name))?;

    let mut query = job.query.clone();
    if let Some(lang) = &options.lang {
        let column = job
            .language_column
            .as_deref()
            .ok_or_else(|| eyre::eyre!("Job {} has no language-column, cannot filter by language", job.name))?;
        query = query.filter(column, lang.as_str());
    }
    if let Some(limit) = options.limit {
        query = query.limit(limit);
    }

    let settings = SyncSettings::new(query, &job.table, job.conflict_key.clone())
        .batch_size(
            options
                .batch_size
                .or(job.batch_size)
                .unwrap_or(config.defaults.batch_size),
        )
        .dry_run(options.dry_run)
        .write_attempts(job.write_attempts.unwrap_or(config.defaults.write_attempts))
        .retry_backoff(Duration::from_millis(config.defaults.retry_backoff_ms));

    BatchSynchronizer::configure(
        settings,
        Arc::new(SqliteSource::new(&job.source_path)),
        Arc::new(job.mapping.clone()),
        destination,
    )
    .context(format!("Invalid job {}", job.name))
}

/// A built job waiting to run, with the batches to retry if any
struct PlannedJob<'a> {
    name: &'a str,
    sync: BatchSynchronizer,
    retry: Option<BTreeSet<usize>>,
}

/// Run the selected jobs in order.
///
/// Every job is built before any of them runs, so configuration errors
/// abort with nothing written. A source read error stops the run but keeps
/// the reports of the jobs that already ran; the summary is marked aborted.
///
/// With `retry`, each job re-runs only the batches that failed in the earlier
/// summary, using that run's batch size, language and limit unless overridden.
pub async fn run(
    config: &Config,
    options: &RunOptions,
    retry: Option<&RunSummary>,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    config.validate()?;
    let destination = build_destination(&config.destination);

    let mut planned = Vec::new();
    for job in select_jobs(config, &options.jobs)? {
        let mut job_options = options.clone();
        let failed = match retry {
            Some(earlier) => match earlier.job(&job.name) {
                Some(previous) => {
                    job_options.batch_size = job_options.batch_size.or(Some(previous.batch_size));
                    job_options.lang = job_options.lang.or_else(|| earlier.lang.clone());
                    job_options.limit = job_options.limit.or(earlier.limit);
                    let failed: BTreeSet<usize> = previous.report.failed_batches().into_iter().collect();
                    if failed.is_empty() {
                        info!(job = %job.name, "No failed batches to retry");
                        continue;
                    }
                    Some(failed)
                }
                None => {
                    info!(job = %job.name, "Job not in earlier report, skipping");
                    continue;
                }
            },
            None => None,
        };

        planned.push(PlannedJob {
            name: &job.name,
            sync: build_job(config, job, &job_options, Arc::clone(&destination))?,
            retry: failed,
        });
    }

    let mut summary = RunSummary::new(options);
    for job in planned {
        if cancel.is_cancelled() {
            info!(job = %job.name, "Run cancelled, skipping remaining jobs");
            break;
        }

        let result = match &job.retry {
            Some(failed) => {
                info!(job = %job.name, batches = ?failed, "Retrying failed batches");
                job.sync.run_selected(failed, cancel).await
            }
            None => job.sync.run_with_cancel(cancel).await,
        };

        match result {
            Ok(report) => summary.jobs.push(JobReport {
                job: job.name.to_string(),
                batch_size: job.sync.batch_size(),
                report,
            }),
            Err(e) => {
                let reason = format!("Job {} aborted: {}", job.name, e);
                warn!(job = %job.name, error = %e, "Job aborted, stopping run");
                summary.aborted = Some(reason);
                break;
            }
        }
    }

    summary.finished_at = Some(Utc::now());
    Ok(summary)
}
