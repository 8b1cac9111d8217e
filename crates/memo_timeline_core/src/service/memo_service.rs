//! Memo mutation use-cases.
//!
//! # Responsibility
//! - Add, edit, retime and delete memos of one record.
//! - Invalidate the timeline cache after every committed write.
//!
//! # Invariants
//! - Every mutation reads the field fresh from the store, never from a cache.
//! - One decode, one change, one encode and at most one `write_field` per call.
//! - Mutations of one record are serialized by a per-record lock; different
//!   records never wait on each other and no collection-wide lock exists.
//! - Input validation happens before any store I/O.
//! - A failed mutation leaves the stored field byte-identical.
//!
//! # See also
//! - `timeline::cache` for the epoch contract.

use crate::codec::{self, EncodeError, ParseError};
use crate::config::ConflictPolicy;
use crate::model::memo::{
    normalize_memo_text, MemoId, MemoRecord, MemoValidationError, RecordId, RecordMemoLog,
};
use crate::model::timeline::RecordRef;
use crate::store::{CollectionStore, StoreError};
use crate::timeline::cache::CacheEpoch;
use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Service error for memo mutations.
#[derive(Debug)]
pub enum MemoServiceError {
    /// Input rejected before touching the store.
    Validation(MemoValidationError),
    RecordNotFound(RecordId),
    MemoNotFound { record_id: RecordId, memo_id: MemoId },
    /// Record exists but has no memo field.
    FieldMissing(RecordId),
    /// Stored log is malformed; it is left as is.
    Parse { record_id: RecordId, error: ParseError },
    Encode(EncodeError),
    /// Store refused the write; the previous log is still stored.
    Write { record_id: RecordId, source: StoreError },
    /// Field changed between read and write (`ConflictPolicy::Detect`).
    Conflict(RecordId),
    Store(StoreError),
}

impl Display for MemoServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::RecordNotFound(record_id) => write!(f, "record not found: {record_id}"),
            Self::MemoNotFound { record_id, memo_id } => {
                write!(f, "memo {memo_id} not found in record {record_id}")
            }
            Self::FieldMissing(record_id) => {
                write!(f, "record {record_id} has no memo field")
            }
            Self::Parse { record_id, error } => write!(f, "record {record_id}: {error}"),
            Self::Encode(err) => write!(f, "{err}"),
            Self::Write { record_id, source } => {
                write!(f, "failed to write record {record_id}: {source}")
            }
            Self::Conflict(record_id) => {
                write!(f, "record {record_id} changed while being updated")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MemoServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Parse { error, .. } => Some(error),
            Self::Encode(err) => Some(err),
            Self::Write { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MemoValidationError> for MemoServiceError {
    fn from(value: MemoValidationError) -> Self {
        Self::Validation(value)
    }
}

impl MemoServiceError {
    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::RecordNotFound(_) => "record_not_found",
            Self::MemoNotFound { .. } => "memo_not_found",
            Self::FieldMissing(_) => "field_missing",
            Self::Parse { .. } => "parse_failed",
            Self::Encode(_) => "encode_failed",
            Self::Write { .. } => "write_failed",
            Self::Conflict(_) => "conflict",
            Self::Store(_) => "store_failed",
        }
    }
}

enum Change<T> {
    Changed(T),
    Unchanged(T),
}

/// Per-record exclusive locks, created on demand and dropped when idle.
#[derive(Default)]
struct RecordLocks {
    locks: Mutex<HashMap<RecordId, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    fn with_lock<T>(&self, record_id: RecordId, f: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(self.locks.lock().entry(record_id).or_default());
        let result = {
            let _guard = lock.lock();
            f()
        };
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&record_id);
        }
        result
    }

    fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Memo mutation service over a collection store.
pub struct MemoService<S: CollectionStore> {
    store: S,
    field: String,
    conflict_policy: ConflictPolicy,
    epoch: CacheEpoch,
    locks: RecordLocks,
}

impl<S: CollectionStore> MemoService<S> {
    /// Creates a service writing `field` and bumping `epoch` on every commit.
    pub fn new(store: S, field: impl Into<String>, epoch: CacheEpoch) -> Self {
        Self {
            store,
            field: field.into(),
            conflict_policy: ConflictPolicy::default(),
            epoch,
            locks: RecordLocks::default(),
        }
    }

    pub fn with_conflict_policy(mut self, conflict_policy: ConflictPolicy) -> Self {
        self.conflict_policy = conflict_policy;
        self
    }

    /// Appends a memo to the end of the record's log.
    ///
    /// `timestamp` defaults to the current time.
    ///
    /// # Errors
    /// - `Validation` for blank text, before any store access.
    /// - `RecordNotFound`, `FieldMissing`, `Parse`, `Write`, `Conflict`.
    pub fn add(
        &self,
        record_id: RecordId,
        text: impl Into<String>,
        timestamp: Option<i64>,
    ) -> Result<MemoRecord, MemoServiceError> {
        let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
        let mut memo = MemoRecord::new(text, timestamp)?;
        self.mutate(record_id, "add", move |log| {
            while log.get(&memo.id).is_some() {
                memo.id = MemoId::generate();
            }
            log.push(memo.clone());
            Ok(Change::Changed(memo))
        })
    }

    /// Replaces the text of one memo, keeping id, timestamp and position.
    ///
    /// Text equal to the stored text is a no-op: nothing is written and the
    /// cache is not invalidated.
    pub fn edit(
        &self,
        record_id: RecordId,
        memo_id: &MemoId,
        text: impl Into<String>,
    ) -> Result<MemoRecord, MemoServiceError> {
        let text = normalize_memo_text(text.into())?;
        self.mutate(record_id, "edit", |log| {
            let current = find_memo(log, record_id, memo_id)?;
            if current.text == text {
                return Ok(Change::Unchanged(current.clone()));
            }
            let updated = current.with_text(text)?;
            log.replace(updated.clone());
            Ok(Change::Changed(updated))
        })
    }

    /// Moves one memo to another timestamp, keeping its log position.
    pub fn retime(
        &self,
        record_id: RecordId,
        memo_id: &MemoId,
        timestamp: i64,
    ) -> Result<MemoRecord, MemoServiceError> {
        self.mutate(record_id, "retime", |log| {
            let current = find_memo(log, record_id, memo_id)?;
            if current.timestamp == timestamp {
                return Ok(Change::Unchanged(current.clone()));
            }
            let updated = current.with_timestamp(timestamp);
            log.replace(updated.clone());
            Ok(Change::Changed(updated))
        })
    }

    /// Removes one memo; returns the removed value.
    pub fn delete(
        &self,
        record_id: RecordId,
        memo_id: &MemoId,
    ) -> Result<MemoRecord, MemoServiceError> {
        self.mutate(record_id, "delete", |log| {
            log.remove(memo_id)
                .map(Change::Changed)
                .ok_or_else(|| MemoServiceError::MemoNotFound {
                    record_id,
                    memo_id: memo_id.clone(),
                })
        })
    }

    /// Reads one record's log fresh from the store, in stored order.
    pub fn list(&self, record_id: RecordId) -> Result<Vec<MemoRecord>, MemoServiceError> {
        let raw = self.read_raw(record_id)?;
        let log = decode_log(record_id, &raw)?;
        Ok(log.into_memos())
    }

    /// Resolves a navigable reference to the record.
    pub fn resolve_record(&self, record_id: RecordId) -> Result<RecordRef, MemoServiceError> {
        self.store
            .resolve_record(record_id)
            .map_err(|err| map_read_error(record_id, err))
    }

    fn mutate<T>(
        &self,
        record_id: RecordId,
        op: &'static str,
        change: impl FnOnce(&mut RecordMemoLog) -> Result<Change<T>, MemoServiceError>,
    ) -> Result<T, MemoServiceError> {
        self.locks
            .with_lock(record_id, || self.mutate_locked(record_id, op, change))
            .inspect_err(|err| {
                warn!(
                    "event=memo_{op} module=service status=error error_code={} record_id={record_id}",
                    err.code()
                );
            })
    }

    fn mutate_locked<T>(
        &self,
        record_id: RecordId,
        op: &'static str,
        change: impl FnOnce(&mut RecordMemoLog) -> Result<Change<T>, MemoServiceError>,
    ) -> Result<T, MemoServiceError> {
        let raw = self.read_raw(record_id)?;
        let mut log = decode_log(record_id, &raw)?;
        let value = match change(&mut log)? {
            Change::Changed(value) => value,
            Change::Unchanged(value) => {
                debug!("event=memo_{op} module=service status=skipped reason=unchanged record_id={record_id}");
                return Ok(value);
            }
        };
        let encoded = codec::encode(&log).map_err(MemoServiceError::Encode)?;

        if self.conflict_policy == ConflictPolicy::Detect && self.read_raw(record_id)? != raw {
            return Err(MemoServiceError::Conflict(record_id));
        }

        self.store
            .write_field(record_id, &self.field, &encoded)
            .map_err(|err| map_write_error(record_id, err))?;
        let epoch = self.epoch.bump();
        info!(
            "event=memo_{op} module=service status=ok record_id={record_id} memos={} epoch={epoch}",
            log.len()
        );
        Ok(value)
    }

    fn read_raw(&self, record_id: RecordId) -> Result<String, MemoServiceError> {
        self.store
            .read_field(record_id, &self.field)
            .map_err(|err| map_read_error(record_id, err))
    }

    /// Number of records with a live lock entry.
    pub fn tracked_locks(&self) -> usize {
        self.locks.tracked()
    }
}

fn find_memo<'a>(
    log: &'a RecordMemoLog,
    record_id: RecordId,
    memo_id: &MemoId,
) -> Result<&'a MemoRecord, MemoServiceError> {
    log.get(memo_id).ok_or_else(|| MemoServiceError::MemoNotFound {
        record_id,
        memo_id: memo_id.clone(),
    })
}

fn decode_log(record_id: RecordId, raw: &str) -> Result<RecordMemoLog, MemoServiceError> {
    codec::decode(raw).map_err(|error| MemoServiceError::Parse { record_id, error })
}

fn map_read_error(record_id: RecordId, err: StoreError) -> MemoServiceError {
    match err {
        StoreError::RecordNotFound(id) => MemoServiceError::RecordNotFound(id),
        StoreError::FieldMissing { .. } => MemoServiceError::FieldMissing(record_id),
        other => MemoServiceError::Store(other),
    }
}

fn map_write_error(record_id: RecordId, err: StoreError) -> MemoServiceError {
    match err {
        StoreError::RecordNotFound(id) => MemoServiceError::RecordNotFound(id),
        source => MemoServiceError::Write { record_id, source },
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoService, MemoServiceError};
    use crate::model::memo::{MemoId, MemoValidationError};
    use crate::store::MemoryCollectionStore;
    use crate::timeline::cache::CacheEpoch;

    fn service() -> MemoService<MemoryCollectionStore> {
        let store = MemoryCollectionStore::new();
        store.insert_record(1, None, [("Front", "q"), ("_MemoLog", "")]);
        MemoService::new(store, "_MemoLog", CacheEpoch::new())
    }

    #[test]
    fn add_appends_and_bumps_epoch() {
        let epoch = CacheEpoch::new();
        let store = MemoryCollectionStore::new();
        store.insert_record(1, None, [("_MemoLog", "")]);
        let service = MemoService::new(store, "_MemoLog", epoch.clone());

        let first = service.add(1, " first ", Some(10)).unwrap();
        service.add(1, "second", Some(5)).unwrap();

        assert_eq!(first.text, "first");
        let memos = service.list(1).unwrap();
        assert_eq!(memos.len(), 2);
        assert_eq!(memos[1].text, "second");
        assert_eq!(epoch.current(), 2);
        assert_eq!(service.tracked_locks(), 0);
    }

    #[test]
    fn blank_text_is_rejected_before_io() {
        let service = service();
        let err = service.add(99, "   ", Some(1)).unwrap_err();
        assert!(matches!(
            err,
            MemoServiceError::Validation(MemoValidationError::EmptyText)
        ));
    }

    #[test]
    fn unchanged_edit_skips_write() {
        let epoch = CacheEpoch::new();
        let store = MemoryCollectionStore::new();
        store.insert_record(1, None, [("_MemoLog", "")]);
        let service = MemoService::new(store, "_MemoLog", epoch.clone());
        let memo = service.add(1, "same", Some(1)).unwrap();

        let edited = service.edit(1, &memo.id, "same  ").unwrap();
        assert_eq!(edited, memo);
        assert_eq!(epoch.current(), 1);
    }

    #[test]
    fn missing_memo_and_record_are_reported() {
        let service = service();
        let missing = MemoId::from("nope");
        assert!(matches!(
            service.delete(1, &missing).unwrap_err(),
            MemoServiceError::MemoNotFound { record_id: 1, .. }
        ));
        assert!(matches!(
            service.edit(2, &missing, "x").unwrap_err(),
            MemoServiceError::RecordNotFound(2)
        ));
    }
}
