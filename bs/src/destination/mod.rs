//! Destination stores that accept upserts

mod postgrest;
mod sqlite;

pub use postgrest::{PostgrestConfig, PostgrestDestination};
pub use sqlite::SqliteDestination;

use async_trait::async_trait;

use crate::error::WriteError;
use crate::record::{ConflictKey, MappedRecord};

/// A destination store, connected at most once per run.
///
/// The writer returned by `connect` owns the connection; dropping it releases
/// the connection.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    async fn connect(&self) -> Result<Box<dyn DestinationWriter>, WriteError>;
}

/// An open connection that upserts whole batches
#[async_trait]
pub trait DestinationWriter: Send {
    /// Insert-or-update `records` into `table`, matching existing rows on
    /// `key`. One call is one atomic batch: it either commits completely or
    /// not at all, and never leaves two rows with the same key.
    async fn upsert(&mut self, table: &str, records: &[MappedRecord], key: &ConflictKey) -> Result<(), WriteError>;
}

/// Column set shared by every record of a batch, in record order.
///
/// A writer that sends one column list per batch cannot tell a missing field
/// from a null one, so batches mixing column sets are refused rather than
/// padded with nulls.
pub(crate) fn uniform_columns(records: &[MappedRecord]) -> Result<Vec<&str>, WriteError> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&str> = first.columns().collect();
    for (index, record) in records.iter().enumerate().skip(1) {
        if !record.columns().eq(columns.iter().copied()) {
            return Err(WriteError::InvalidBatch(format!(
                "record {} has columns [{}], expected [{}]",
                index,
                record.columns().collect::<Vec<_>>().join(", "),
                columns.join(", ")
            )));
        }
    }
    Ok(columns)
}
