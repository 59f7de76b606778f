//! Record types flowing through the pipeline

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{ConfigError, TransformError};
use crate::ident;
use crate::value::Value;

/// Field name to value, ordered by field name
pub type Fields = BTreeMap<String, Value>;

/// A row as read from the source store. Immutable once read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRecord {
    fields: Fields,
}

impl SourceRecord {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SourceRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A row in destination field names, derived from exactly one `SourceRecord`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappedRecord {
    fields: Fields,
}

impl MappedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MappedRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Ordered destination columns whose combined value identifies a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ConflictKey(Vec<String>);

impl ConflictKey {
    /// Build a key; rejects an empty list, invalid names and repeated columns
    pub fn new<I, S>(columns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(ConfigError::EmptyConflictKey);
        }

        let mut seen = HashSet::new();
        for column in &columns {
            ident::check(column)?;
            if !seen.insert(column.as_str()) {
                return Err(ConfigError::DuplicateKeyColumn(column.clone()));
            }
        }

        Ok(Self(columns))
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }

    /// Extract this key's value from a record.
    ///
    /// Every key column must be present and non-empty.
    pub fn key_of(&self, record: &MappedRecord) -> Result<RecordKey, TransformError> {
        self.0
            .iter()
            .map(|column| {
                record
                    .get(column)
                    .and_then(Value::key_fragment)
                    .ok_or_else(|| TransformError::MissingKey(column.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RecordKey)
    }
}

impl TryFrom<Vec<String>> for ConflictKey {
    type Error = ConfigError;

    fn try_from(columns: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(columns)
    }
}

impl From<ConflictKey> for Vec<String> {
    fn from(key: ConflictKey) -> Self {
        key.0
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// The conflict-key value of one record, comparable across records
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey(Vec<String>);
