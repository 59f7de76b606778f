//! Per-run outcome log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransformError;

/// What happened to one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Committed, or simulated when running dry
    Success { simulated: bool },
    /// Could not be committed; the run moved on
    Failure { reason: String },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success { .. })
    }
}

/// Result of one batch, in submission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Zero-based position of the batch in the partitioned run
    pub batch_index: usize,
    /// Records submitted after in-batch deduplication
    pub record_count: usize,
    /// Earlier duplicates dropped by last-write-wins
    #[serde(default)]
    pub duplicates_dropped: usize,
    /// Write attempts made (0 when simulated or never connected)
    #[serde(default)]
    pub attempts: u32,
    pub outcome: BatchOutcome,
}

/// A source record that was skipped because it could not be mapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Position of the record in the source result set
    pub record_index: usize,
    /// Always `None`: transform failures belong to no batch
    pub batch_index: Option<usize>,
    pub reason: String,
}

/// Aggregate counts over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTotals {
    /// Records submitted across all attempted batches
    pub attempted: usize,
    /// Records in batches that succeeded
    pub succeeded: usize,
    /// Records in batches that failed
    pub failed: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    /// Records skipped by transform errors
    pub transform_failed: usize,
}

/// Ordered outcome log of one synchronizer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    pub table: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Records returned by the source query
    pub source_records: usize,
    /// Batches the run was partitioned into, attempted or not
    pub batches_planned: usize,
    pub batches: Vec<BatchResult>,
    pub transform_errors: Vec<RecordFailure>,
    /// Set when the caller stopped the run between batches
    pub cancelled: bool,
    pub totals: SyncTotals,
}

impl SyncReport {
    pub fn new(table: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::now_v7().to_string(),
            table: table.into(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            source_records: 0,
            batches_planned: 0,
            batches: Vec::new(),
            transform_errors: Vec::new(),
            cancelled: false,
            totals: SyncTotals::default(),
        }
    }

    /// Append a batch result and fold it into the totals
    pub fn push_batch(&mut self, result: BatchResult) {
        self.totals.attempted += result.record_count;
        if result.outcome.is_success() {
            self.totals.succeeded += result.record_count;
            self.totals.batches_succeeded += 1;
        } else {
            self.totals.failed += result.record_count;
            self.totals.batches_failed += 1;
        }
        self.batches.push(result);
    }

    /// Record a skipped source record
    pub fn push_transform_error(&mut self, record_index: usize, error: &TransformError) {
        self.totals.transform_failed += 1;
        self.transform_errors.push(RecordFailure {
            record_index,
            batch_index: None,
            reason: error.to_string(),
        });
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Indices of failed batches, for a targeted retry
    pub fn failed_batches(&self) -> Vec<usize> {
        self.batches
            .iter()
            .filter(|b| !b.outcome.is_success())
            .map(|b| b.batch_index)
            .collect()
    }

    /// True when every planned batch was attempted and nothing failed
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.totals.batches_failed == 0 && self.transform_errors.is_empty()
    }
}
