//! SQLite source reader

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Source, SourceQuery, SourceReader};
use crate::error::SourceError;
use crate::record::{Fields, SourceRecord};
use crate::value::Value;

/// A local SQLite database file, always opened read-only
#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
}

impl SqliteSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for SqliteSource {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn open(&self) -> Result<Box<dyn SourceReader>, SourceError> {
        if !self.path.exists() {
            return Err(SourceError::NotFound(self.path.clone()));
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), "SqliteSource::open: opened read-only");
        Ok(Box::new(SqliteReader {
            conn,
            path: self.path.clone(),
        }))
    }
}

struct SqliteReader {
    conn: Connection,
    path: PathBuf,
}

impl SourceReader for SqliteReader {
    fn fetch(&mut self, query: &SourceQuery) -> Result<Vec<SourceRecord>, SourceError> {
        let (sql, params) = query.to_sql()?;
        debug!(%sql, params = params.len(), "SqliteReader::fetch: executing");

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = Fields::new();
            for (i, name) in names.iter().enumerate() {
                fields.insert(name.clone(), Value::from_sql_ref(row.get_ref(i)?));
            }
            records.push(SourceRecord::new(fields));
        }

        info!(table = %query.table, count = records.len(), "Read source records");
        Ok(records)
    }
}

impl Drop for SqliteReader {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "SqliteReader: closing source connection");
    }
}
