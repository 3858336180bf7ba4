//! Record store adapter: the document collection the pipelines read and write.

#[cfg(test)]
pub mod memory;
pub mod sqlite;

use crate::error::StoreError;
use crate::record::{Document, StoredRecord};

pub use sqlite::{open_store, SqliteStore};

/// Collection name records live under.
pub const COLLECTION: &str = "users";

pub trait RecordStore {
    /// Persists a new document and returns the id the store assigned.
    fn add(&mut self, document: &Document) -> Result<String, StoreError>;

    /// Every current record. No ordering guarantee and no snapshot isolation
    /// against other writers.
    fn stream_all(&self) -> Result<Vec<StoredRecord>, StoreError>;

    /// Fails with `NotFound` when `id` does not exist.
    fn delete(&mut self, id: &str) -> Result<(), StoreError>;

    fn query_equals(&self, field: &str, value: &str) -> Result<Vec<StoredRecord>, StoreError>;
}

pub(crate) fn check_field_name(field: &str) -> Result<(), StoreError> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::Rejected(format!("invalid field name: {field:?}")));
    }
    Ok(())
}
