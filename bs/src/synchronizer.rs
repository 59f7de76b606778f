//! BatchSynchronizer - read, transform, batch and upsert
//!
//! One run reads the full source result set up front, maps every record,
//! partitions the mapped records into ordered batches and upserts them one
//! batch at a time. A batch that fails is logged in the report and the run
//! moves on; only configuration and source-read failures abort a run.

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{self, KeyedRecord};
use crate::destination::{Destination, DestinationWriter};
use crate::error::{ConfigError, SyncError};
use crate::ident;
use crate::record::{ConflictKey, MappedRecord, SourceRecord};
use crate::report::{BatchOutcome, BatchResult, SyncReport};
use crate::source::{Source, SourceQuery};
use crate::transform::Transform;

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default delay before the first retry of a batch; doubles each attempt
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Everything a run needs besides its collaborators
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub query: SourceQuery,
    pub destination_table: String,
    pub conflict_key: Vec<String>,
    pub batch_size: usize,
    pub dry_run: bool,
    /// Total attempts per batch for retryable write errors
    pub write_attempts: u32,
    pub retry_backoff: Duration,
}

impl SyncSettings {
    pub fn new<I, S>(query: SourceQuery, destination_table: impl Into<String>, conflict_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query,
            destination_table: destination_table.into(),
            conflict_key: conflict_key.into_iter().map(Into::into).collect(),
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            write_attempts: 1,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Lazily-connected destination writer for one run
enum WriterSlot {
    Idle,
    Ready(Box<dyn DestinationWriter>),
    Broken(String),
}

impl WriterSlot {
    async fn acquire(&mut self, destination: &dyn Destination) -> Result<&mut (dyn DestinationWriter + 'static), String> {
        if let WriterSlot::Idle = self {
            *self = match destination.connect().await {
                Ok(writer) => {
                    info!(destination = %destination.describe(), "Connected to destination");
                    WriterSlot::Ready(writer)
                }
                Err(e) => {
                    warn!(destination = %destination.describe(), error = %e, "Destination connect failed");
                    WriterSlot::Broken(e.to_string())
                }
            };
        }

        match self {
            WriterSlot::Ready(writer) => Ok(writer.as_mut()),
            WriterSlot::Broken(reason) => Err(reason.clone()),
            WriterSlot::Idle => Err("destination not connected".to_string()),
        }
    }
}

/// Moves records from a source to a destination in ordered batches
pub struct BatchSynchronizer {
    source: Arc<dyn Source>,
    transform: Arc<dyn Transform>,
    destination: Arc<dyn Destination>,
    query: SourceQuery,
    table: String,
    conflict_key: ConflictKey,
    batch_size: NonZeroUsize,
    dry_run: bool,
    write_attempts: u32,
    retry_backoff: Duration,
}

impl fmt::Debug for BatchSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSynchronizer")
            .field("source", &self.source.describe())
            .field("destination", &self.destination.describe())
            .field("table", &self.table)
            .field("conflict_key", &self.conflict_key.to_string())
            .field("batch_size", &self.batch_size)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl BatchSynchronizer {
    /// Validate settings and bind the collaborators.
    ///
    /// Fails before anything runs when the batch size is zero, the conflict
    /// key is empty or repeats a column, or a name is not a plain identifier.
    pub fn configure(
        settings: SyncSettings,
        source: Arc<dyn Source>,
        transform: Arc<dyn Transform>,
        destination: Arc<dyn Destination>,
    ) -> Result<Self, ConfigError> {
        debug!(?settings, "BatchSynchronizer::configure: called");
        let batch_size =
            NonZeroUsize::new(settings.batch_size).ok_or(ConfigError::InvalidBatchSize(settings.batch_size))?;
        let conflict_key = ConflictKey::new(settings.conflict_key)?;

        if settings.destination_table.trim().is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        ident::check(&settings.destination_table)?;
        settings.query.validate()?;

        if settings.write_attempts == 0 {
            return Err(ConfigError::InvalidWriteAttempts);
        }

        Ok(Self {
            source,
            transform,
            destination,
            query: settings.query,
            table: settings.destination_table,
            conflict_key,
            batch_size,
            dry_run: settings.dry_run,
            write_attempts: settings.write_attempts,
            retry_backoff: settings.retry_backoff,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn conflict_key(&self) -> &ConflictKey {
        &self.conflict_key
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn query(&self) -> &SourceQuery {
        &self.query
    }

    /// Run every batch to completion
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        self.execute(&CancellationToken::new(), None).await
    }

    /// Run, checking `cancel` before each batch
    pub async fn run_with_cancel(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        self.execute(cancel, None).await
    }

    /// Run only the batches at `indices`, e.g. the failures of an earlier report.
    ///
    /// Batch boundaries depend only on the source data, so identical input
    /// yields identical batch indices.
    pub async fn run_selected(
        &self,
        indices: &BTreeSet<usize>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        self.execute(cancel, Some(indices)).await
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        selection: Option<&BTreeSet<usize>>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new(&self.table, self.dry_run);
        info!(
            run_id = %report.run_id,
            source = %self.source.describe(),
            table = %self.table,
            dry_run = self.dry_run,
            "Starting sync run"
        );

        let records = self.read_source()?;
        report.source_records = records.len();

        let keyed = self.map_records(&records, &mut report);
        drop(records);

        let batches = batch::partition(keyed, self.batch_size);
        report.batches_planned = batches.len();

        let mut writer = WriterSlot::Idle;
        let mut cancelled = false;

        for (index, batch) in batches.into_iter().enumerate() {
            if selection.is_some_and(|s| !s.contains(&index)) {
                continue;
            }
            if cancel.is_cancelled() {
                info!(batch_index = index, "Run cancelled before batch");
                cancelled = true;
                break;
            }

            let (records, duplicates_dropped) = batch::dedupe_last_wins(batch);
            let (outcome, attempts) = if self.dry_run {
                (BatchOutcome::Success { simulated: true }, 0)
            } else {
                self.write_batch(&mut writer, index, &records).await
            };

            match &outcome {
                BatchOutcome::Success { simulated } => {
                    debug!(batch_index = index, records = records.len(), simulated, "Batch committed");
                }
                BatchOutcome::Failure { reason } => {
                    warn!(batch_index = index, records = records.len(), %reason, "Batch failed");
                }
            }

            report.push_batch(BatchResult {
                batch_index: index,
                record_count: records.len(),
                duplicates_dropped,
                attempts,
                outcome,
            });
        }

        // releases the destination connection, if one was opened
        drop(writer);
        report.finish(cancelled);

        info!(
            run_id = %report.run_id,
            attempted = report.totals.attempted,
            succeeded = report.totals.succeeded,
            failed = report.totals.failed,
            transform_failed = report.totals.transform_failed,
            cancelled,
            "Sync run finished"
        );
        Ok(report)
    }

    /// Open the source, run the query and release the source again
    fn read_source(&self) -> Result<Vec<SourceRecord>, SyncError> {
        let mut reader = self.source.open()?;
        let records = reader.fetch(&self.query)?;
        debug!(count = records.len(), "BatchSynchronizer::read_source: fetched");
        Ok(records)
    }

    fn map_records(&self, records: &[SourceRecord], report: &mut SyncReport) -> Vec<KeyedRecord> {
        records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let mapped = self.transform.apply(record).and_then(|mapped| {
                    let key = self.conflict_key.key_of(&mapped)?;
                    Ok(KeyedRecord { key, record: mapped })
                });
                match mapped {
                    Ok(keyed) => Some(keyed),
                    Err(e) => {
                        warn!(record_index = index, error = %e, "Skipping record");
                        report.push_transform_error(index, &e);
                        None
                    }
                }
            })
            .collect()
    }

    async fn write_batch(&self, slot: &mut WriterSlot, index: usize, records: &[MappedRecord]) -> (BatchOutcome, u32) {
        let writer = match slot.acquire(self.destination.as_ref()).await {
            Ok(writer) => writer,
            Err(reason) => return (BatchOutcome::Failure { reason }, 0),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match writer.upsert(&self.table, records, &self.conflict_key).await {
                Ok(()) => return (BatchOutcome::Success { simulated: false }, attempt),
                Err(e) if e.is_retryable() && attempt < self.write_attempts => {
                    let delay = self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(batch_index = index, attempt, error = %e, ?delay, "Retrying batch");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (BatchOutcome::Failure { reason: e.to_string() }, attempt),
            }
        }
    }
}
