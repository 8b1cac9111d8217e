//! Memo and per-record memo log model.
//!
//! # Responsibility
//! - Define the canonical memo value attached to one collection record.
//! - Provide lifecycle helpers used by the mutation service.
//!
//! # Invariants
//! - `text` is never empty or whitespace-only.
//! - `id` is stable for the memo lifetime and unique inside its log.
//! - Keys unknown to this crate travel in `extra` and are re-emitted verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identifier of one record in the host collection.
///
/// Kept as a type alias so signatures read as record ids, not bare integers.
pub type RecordId = i64;

/// Opaque memo identifier, unique within one record's log.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoId(String);

impl MemoId {
    /// Generates a fresh random id for newly created memos.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Synthetic id for memos persisted before ids were written.
    ///
    /// `ordinal` counts earlier id-less memos in the same log that share `ts`,
    /// so the value survives deletion of unrelated memos.
    pub fn legacy(ts: i64, ordinal: usize) -> Self {
        Self(format!("legacy-{ts}-{ordinal}"))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for MemoId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MemoId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for MemoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validation failures for memo values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoValidationError {
    /// Memo text is empty after trimming.
    EmptyText,
}

impl Display for MemoValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "memo text must not be empty"),
        }
    }
}

impl Error for MemoValidationError {}

/// One timestamped note attached to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoRecord {
    pub id: MemoId,
    /// Unix epoch seconds.
    pub timestamp: i64,
    pub text: String,
    pub author: Option<String>,
    /// Kept in stored order; duplicates are not collapsed.
    pub tags: Option<Vec<String>>,
    /// Unknown keys from the stored object, re-emitted on encode.
    pub extra: BTreeMap<String, Value>,
}

impl MemoRecord {
    /// Creates a memo with a generated id.
    ///
    /// # Errors
    /// - `EmptyText` when `text` is blank.
    pub fn new(text: impl Into<String>, timestamp: i64) -> Result<Self, MemoValidationError> {
        Self::with_id(MemoId::generate(), text, timestamp)
    }

    /// Creates a memo with a caller-provided id.
    pub fn with_id(
        id: MemoId,
        text: impl Into<String>,
        timestamp: i64,
    ) -> Result<Self, MemoValidationError> {
        let text = normalize_memo_text(text.into())?;
        Ok(Self {
            id,
            timestamp,
            text,
            author: None,
            tags: None,
            extra: BTreeMap::new(),
        })
    }

    /// Returns a copy with replaced text, keeping id, timestamp and extras.
    pub fn with_text(&self, text: impl Into<String>) -> Result<Self, MemoValidationError> {
        let text = normalize_memo_text(text.into())?;
        Ok(Self {
            text,
            ..self.clone()
        })
    }

    /// Returns a copy with a replaced timestamp.
    pub fn with_timestamp(&self, timestamp: i64) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

/// Trims memo text and rejects blank input.
pub fn normalize_memo_text(text: String) -> Result<String, MemoValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(MemoValidationError::EmptyText);
    }
    if trimmed.len() == text.len() {
        Ok(text)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Ordered memo log of exactly one record.
///
/// Insertion order is authoritative and mirrors the stored array order.
/// Stored elements that are not memos are kept in `unreadable` and written
/// back after the memos, so rewriting a log never discards stored data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMemoLog {
    memos: Vec<MemoRecord>,
    unreadable: Vec<Value>,
}

impl RecordMemoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_memos(memos: Vec<MemoRecord>) -> Self {
        Self {
            memos,
            unreadable: Vec::new(),
        }
    }

    /// Attaches stored elements that could not be read as memos.
    pub fn with_unreadable(mut self, unreadable: Vec<Value>) -> Self {
        self.unreadable = unreadable;
        self
    }

    /// Stored elements lacking an integer `ts` or non-blank `text`.
    pub fn unreadable(&self) -> &[Value] {
        &self.unreadable
    }

    pub fn memos(&self) -> &[MemoRecord] {
        &self.memos
    }

    pub fn into_memos(self) -> Vec<MemoRecord> {
        self.memos
    }

    pub fn len(&self) -> usize {
        self.memos.len()
    }

    /// True when the log holds no memos; unreadable elements are not counted.
    pub fn is_empty(&self) -> bool {
        self.memos.is_empty()
    }

    pub fn position(&self, id: &MemoId) -> Option<usize> {
        self.memos.iter().position(|memo| &memo.id == id)
    }

    pub fn get(&self, id: &MemoId) -> Option<&MemoRecord> {
        self.memos.iter().find(|memo| &memo.id == id)
    }

    /// Appends at the end of the log.
    pub fn push(&mut self, memo: MemoRecord) {
        self.memos.push(memo);
    }

    /// Replaces the memo with the same id at its current position.
    ///
    /// Returns the previous value, or `None` when the id is absent.
    pub fn replace(&mut self, memo: MemoRecord) -> Option<MemoRecord> {
        let index = self.position(&memo.id)?;
        Some(std::mem::replace(&mut self.memos[index], memo))
    }

    /// Removes the memo with `id`, shrinking the log.
    pub fn remove(&mut self, id: &MemoId) -> Option<MemoRecord> {
        let index = self.position(id)?;
        Some(self.memos.remove(index))
    }
}

/// Display/truncation parameters consumed by the timeline view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Upper bound on returned entries; never applied to stored logs.
    pub max_display_memos: usize,
}

/// Default display cap used when configuration does not set one.
pub const DEFAULT_MAX_DISPLAY_MEMOS: usize = 500;

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_display_memos: DEFAULT_MAX_DISPLAY_MEMOS,
        }
    }
}
