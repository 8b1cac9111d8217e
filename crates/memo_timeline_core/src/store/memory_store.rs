//! In-memory collection store.
//!
//! Used when the host keeps records in process, and as the reference store in
//! tests. Field order per record is preserved; the first field feeds the
//! record snippet.

use crate::model::memo::RecordId;
use crate::model::timeline::{RecordContext, RecordRef};
use crate::store::{derive_snippet, CollectionStore, StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct StoredRecord {
    deck_name: Option<String>,
    fields: Vec<(String, String)>,
}

impl StoredRecord {
    fn field(&self, name: &str) -> Option<&String> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        self.fields
            .iter_mut()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// Thread-safe in-memory record collection.
#[derive(Debug, Default)]
pub struct MemoryCollectionStore {
    records: RwLock<BTreeMap<RecordId, StoredRecord>>,
}

impl MemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record with ordered `(name, value)` fields.
    pub fn insert_record<N, V>(
        &self,
        record_id: RecordId,
        deck_name: Option<&str>,
        fields: impl IntoIterator<Item = (N, V)>,
    ) where
        N: Into<String>,
        V: Into<String>,
    {
        let record = StoredRecord {
            deck_name: deck_name.map(str::to_string),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        };
        self.records.write().insert(record_id, record);
    }

    /// Removes a record; returns whether it existed.
    pub fn remove_record(&self, record_id: RecordId) -> bool {
        self.records.write().remove(&record_id).is_some()
    }

    /// Snapshot of one field, for assertions and host-side reads.
    pub fn field(&self, record_id: RecordId, field: &str) -> Option<String> {
        self.records
            .read()
            .get(&record_id)
            .and_then(|record| record.field(field).cloned())
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }
}

impl CollectionStore for MemoryCollectionStore {
    fn query_records_with_field(&self, field: &str) -> StoreResult<Vec<RecordId>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|(_, record)| {
                record
                    .field(field)
                    .is_some_and(|value| !value.trim().is_empty())
            })
            .map(|(id, _)| *id)
            .collect())
    }

    fn read_field(&self, record_id: RecordId, field: &str) -> StoreResult<String> {
        let records = self.records.read();
        let record = records
            .get(&record_id)
            .ok_or(StoreError::RecordNotFound(record_id))?;
        record
            .field(field)
            .cloned()
            .ok_or_else(|| StoreError::FieldMissing {
                record_id,
                field: field.to_string(),
            })
    }

    fn write_field(&self, record_id: RecordId, field: &str, raw: &str) -> StoreResult<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&record_id)
            .ok_or(StoreError::RecordNotFound(record_id))?;
        let value = record
            .field_mut(field)
            .ok_or_else(|| StoreError::FieldMissing {
                record_id,
                field: field.to_string(),
            })?;
        *value = raw.to_string();
        Ok(())
    }

    fn resolve_record(&self, record_id: RecordId) -> StoreResult<RecordRef> {
        if self.records.read().contains_key(&record_id) {
            Ok(RecordRef::for_record(record_id))
        } else {
            Err(StoreError::RecordNotFound(record_id))
        }
    }

    fn record_context(&self, record_id: RecordId) -> StoreResult<Option<RecordContext>> {
        let records = self.records.read();
        let record = records
            .get(&record_id)
            .ok_or(StoreError::RecordNotFound(record_id))?;
        Ok(Some(RecordContext {
            deck_name: record.deck_name.clone(),
            snippet: record
                .fields
                .first()
                .and_then(|(_, value)| derive_snippet(value)),
        }))
    }
}
