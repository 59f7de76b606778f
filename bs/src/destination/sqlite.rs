//! SQLite destination
//!
//! Upserts with `INSERT ... ON CONFLICT (key) DO UPDATE`, one transaction per
//! batch. Each record is written with its own column set. The destination
//! table needs a UNIQUE index (or primary key) over exactly the conflict-key
//! columns.

use async_trait::async_trait;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Destination, DestinationWriter};
use crate::error::WriteError;
use crate::ident;
use crate::record::{ConflictKey, MappedRecord};

#[derive(Debug, Clone)]
pub struct SqliteDestination {
    path: PathBuf,
}

impl SqliteDestination {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Destination for SqliteDestination {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    async fn connect(&self) -> Result<Box<dyn DestinationWriter>, WriteError> {
        let conn = Connection::open(&self.path)
            .map_err(|e| WriteError::Connect(format!("{}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), "SqliteDestination::connect: opened");
        Ok(Box::new(SqliteWriter {
            conn,
            path: self.path.clone(),
        }))
    }
}

struct SqliteWriter {
    conn: Connection,
    path: PathBuf,
}

/// Build the upsert statement for one column set
fn upsert_sql(table: &str, columns: &[&str], key: &ConflictKey) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| ident::quote(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let target: Vec<String> = key.columns().iter().map(|c| ident::quote(c)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !key.contains(c))
        .map(|c| format!("{0} = excluded.{0}", ident::quote(c)))
        .collect();

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        ident::quote(table),
        quoted.join(", "),
        placeholders.join(", "),
        target.join(", "),
        action
    )
}

#[async_trait]
impl DestinationWriter for SqliteWriter {
    async fn upsert(&mut self, table: &str, records: &[MappedRecord], key: &ConflictKey) -> Result<(), WriteError> {
        ident::check(table).map_err(|e| WriteError::InvalidBatch(e.to_string()))?;
        debug!(%table, records = records.len(), "SqliteWriter::upsert: called");

        let tx = self.conn.transaction()?;
        for record in records {
            // columns a record lacks stay untouched on update
            let columns: Vec<&str> = record.columns().collect();
            for column in &columns {
                ident::check(column).map_err(|e| WriteError::InvalidBatch(e.to_string()))?;
            }
            let sql = upsert_sql(table, &columns, key);
            let mut stmt = tx.prepare_cached(&sql)?;
            stmt.execute(rusqlite::params_from_iter(record.fields().values()))?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl Drop for SqliteWriter {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "SqliteWriter: closing destination connection");
    }
}
