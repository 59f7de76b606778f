//! Source-to-destination record transforms

mod mapping;

pub use mapping::{Conversion, DEFAULT_SRCSET_WIDTHS, FieldMapping, FieldRule};

use crate::error::TransformError;
use crate::record::{MappedRecord, SourceRecord};

/// Maps one source record to one destination record.
///
/// Returning an error skips that record; the run carries on.
pub trait Transform: Send + Sync {
    fn apply(&self, record: &SourceRecord) -> Result<MappedRecord, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(&SourceRecord) -> Result<MappedRecord, TransformError> + Send + Sync,
{
    fn apply(&self, record: &SourceRecord) -> Result<MappedRecord, TransformError> {
        self(record)
    }
}
