//! BatchSync - batched upsert synchronization between record stores
//!
//! Reads every record a query selects from a source store, maps each one with
//! a [`Transform`], splits the mapped records into fixed-size batches and
//! upserts each batch into a destination table keyed on a conflict key.
//!
//! # Guarantees
//!
//! - **Batch isolation**: one failed batch never stops the others
//! - **Idempotence**: upserts on the conflict key make repeated runs converge
//! - **Ordered report**: every attempted batch is reported in submission order
//! - **Dry run**: batches are simulated and the destination is never opened
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use batchsync::{BatchSynchronizer, FieldMapping, SourceQuery, SqliteDestination, SqliteSource, SyncSettings};
//!
//! let settings = SyncSettings::new(SourceQuery::new("cards"), "cards", ["card_id"]);
//! let sync = BatchSynchronizer::configure(
//!     settings,
//!     Arc::new(SqliteSource::new("local.db")),
//!     Arc::new(FieldMapping::default()),
//!     Arc::new(SqliteDestination::new("remote.db")),
//! )?;
//! let report = sync.run().await?;
//! ```

pub mod batch;
pub mod destination;
pub mod error;
pub mod record;
pub mod report;
pub mod source;
pub mod transform;
pub mod value;

mod ident;
mod synchronizer;

pub use destination::{Destination, DestinationWriter, PostgrestConfig, PostgrestDestination, SqliteDestination};
pub use error::{ConfigError, SourceError, SyncError, TransformError, WriteError};
pub use record::{ConflictKey, MappedRecord, RecordKey, SourceRecord};
pub use report::{BatchOutcome, BatchResult, RecordFailure, SyncReport, SyncTotals};
pub use source::{Source, SourceQuery, SourceReader, SqliteSource};
pub use synchronizer::{BatchSynchronizer, DEFAULT_BATCH_SIZE, DEFAULT_RETRY_BACKOFF, SyncSettings};
pub use transform::{Conversion, FieldMapping, FieldRule, Transform};
pub use value::Value;

pub use tokio_util::sync::CancellationToken;
