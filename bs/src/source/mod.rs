//! Read-only source stores

mod sqlite;

pub use sqlite::SqliteSource;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ConfigError, SourceError};
use crate::ident;
use crate::record::SourceRecord;
use crate::value::Value;

/// A source store that can be opened for one run.
///
/// The reader returned by `open` holds the connection; dropping it releases
/// the connection.
pub trait Source: Send + Sync {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    fn open(&self) -> Result<Box<dyn SourceReader>, SourceError>;
}

/// An open, read-only connection to a source store
pub trait SourceReader: Send {
    /// Execute `query` and return every matching record, in query order
    fn fetch(&mut self, query: &SourceQuery) -> Result<Vec<SourceRecord>, SourceError>;
}

/// What to read from the source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SourceQuery {
    pub table: String,
    /// Columns to select; empty selects all
    pub columns: Vec<String>,
    /// Equality filters, e.g. `{ language: en }`
    pub filters: BTreeMap<String, Value>,
    pub order_by: Vec<String>,
    pub limit: Option<usize>,
}

impl SourceQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(column.into(), value.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check every identifier before any SQL is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        ident::check(&self.table)?;
        self.columns
            .iter()
            .chain(self.filters.keys())
            .chain(self.order_by.iter())
            .try_for_each(|name| ident::check(name))
    }

    /// Render as a parameterized SELECT
    pub fn to_sql(&self) -> Result<(String, Vec<&Value>), SourceError> {
        self.validate()
            .map_err(|e| SourceError::InvalidQuery(e.to_string()))?;

        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.iter().map(|c| ident::quote(c)).collect::<Vec<_>>().join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, ident::quote(&self.table));

        let mut params = Vec::with_capacity(self.filters.len());
        if !self.filters.is_empty() {
            let clauses: Vec<String> = self
                .filters
                .iter()
                .enumerate()
                .map(|(i, (column, value))| {
                    params.push(value);
                    format!("{} = ?{}", ident::quote(column), i + 1)
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let order: Vec<String> = self.order_by.iter().map(|c| ident::quote(c)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok((sql, params))
    }
}
