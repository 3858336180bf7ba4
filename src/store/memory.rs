use super::{check_field_name, RecordStore};
use crate::error::StoreError;
use crate::record::{Document, StoredRecord};

/// In-process store for pipeline tests. `set_unavailable` makes every call
/// fail the way a dropped backend connection would; `reject_adds` makes
/// writes fail while reads keep working.
#[derive(Default)]
pub struct MemoryStore {
    records: Vec<StoredRecord>,
    next_id: u64,
    unavailable: bool,
    reject_adds: bool,
}

impl MemoryStore {
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    pub fn reject_adds(&mut self, reject: bool) {
        self.reject_adds = reject;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection closed".into()));
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn add(&mut self, document: &Document) -> Result<String, StoreError> {
        self.check_up()?;
        if self.reject_adds {
            return Err(StoreError::Rejected("write denied".into()));
        }
        self.next_id += 1;
        let id = format!("mem-{}", self.next_id);
        self.records.push(StoredRecord {
            id: id.clone(),
            created_at: String::new(),
            document: document.clone(),
        });
        Ok(id)
    }

    fn stream_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        self.check_up()?;
        Ok(self.records.clone())
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.check_up()?;
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn query_equals(&self, field: &str, value: &str) -> Result<Vec<StoredRecord>, StoreError> {
        self.check_up()?;
        check_field_name(field)?;
        Ok(self
            .records
            .iter()
            .filter(|r| r.document.get(field) == Some(value))
            .cloned()
            .collect())
    }
}
