//! Collection store contract and bundled implementations.
//!
//! # Responsibility
//! - Define the narrow interface the engine uses to reach host records.
//! - Provide an in-memory store and a SQLite store for embedding and tests.
//!
//! # Invariants
//! - Stores serialize single-field writes; the engine adds no global lock.
//! - `read_field` distinguishes a missing record from a missing field.
//!
//! # See also
//! - `service::memo_service` for the read-modify-write discipline.

use crate::db::DbError;
use crate::model::memo::RecordId;
use crate::model::timeline::{RecordContext, RecordRef};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryCollectionStore;
pub use sqlite_store::SqliteCollectionStore;

/// Field name holding memo logs in the host collection.
pub const DEFAULT_MEMO_FIELD: &str = "_MemoLog";

const SNIPPET_MAX_CHARS: usize = 50;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

pub type StoreResult<T> = Result<T, StoreError>;

/// Collection store failures.
#[derive(Debug)]
pub enum StoreError {
    /// Record does not exist (never existed or removed).
    RecordNotFound(RecordId),
    /// Record exists but its schema lacks the requested field.
    FieldMissing { record_id: RecordId, field: String },
    /// Store refused a field write.
    WriteRejected { record_id: RecordId, reason: String },
    /// Store cannot serve requests at all (closed, locked, offline).
    Unavailable(String),
    Db(DbError),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordNotFound(id) => write!(f, "record not found: {id}"),
            Self::FieldMissing { record_id, field } => {
                write!(f, "record {record_id} has no field `{field}`")
            }
            Self::WriteRejected { record_id, reason } => {
                write!(f, "write to record {record_id} rejected: {reason}")
            }
            Self::Unavailable(reason) => write!(f, "collection store unavailable: {reason}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid collection data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Narrow view of the host collection consumed by the engine.
pub trait CollectionStore {
    /// Lists records whose `field` holds non-blank content, ascending by id.
    fn query_records_with_field(&self, field: &str) -> StoreResult<Vec<RecordId>>;
    /// Reads one field of one record.
    fn read_field(&self, record_id: RecordId, field: &str) -> StoreResult<String>;
    /// Replaces one field of one record in a single write.
    fn write_field(&self, record_id: RecordId, field: &str, raw: &str) -> StoreResult<()>;
    /// Returns a reference a UI can use to navigate to the record.
    fn resolve_record(&self, record_id: RecordId) -> StoreResult<RecordRef>;
    /// Optional display context (deck, first-field excerpt).
    fn record_context(&self, _record_id: RecordId) -> StoreResult<Option<RecordContext>> {
        Ok(None)
    }
}

impl<S: CollectionStore + ?Sized> CollectionStore for std::sync::Arc<S> {
    fn query_records_with_field(&self, field: &str) -> StoreResult<Vec<RecordId>> {
        (**self).query_records_with_field(field)
    }

    fn read_field(&self, record_id: RecordId, field: &str) -> StoreResult<String> {
        (**self).read_field(record_id, field)
    }

    fn write_field(&self, record_id: RecordId, field: &str, raw: &str) -> StoreResult<()> {
        (**self).write_field(record_id, field, raw)
    }

    fn resolve_record(&self, record_id: RecordId) -> StoreResult<RecordRef> {
        (**self).resolve_record(record_id)
    }

    fn record_context(&self, record_id: RecordId) -> StoreResult<Option<RecordContext>> {
        (**self).record_context(record_id)
    }
}

/// Derives the plain-text excerpt shown next to memos.
///
/// Rules: HTML tags removed, whitespace collapsed, first 50 chars kept with a
/// trailing `...` when cut.
pub fn derive_snippet(first_field: &str) -> Option<String> {
    let without_tags = HTML_TAG_RE.replace_all(first_field, "");
    let normalized = WHITESPACE_RE.replace_all(&without_tags, " ");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut snippet: String = trimmed.chars().take(SNIPPET_MAX_CHARS).collect();
    if trimmed.chars().count() > SNIPPET_MAX_CHARS {
        snippet.push_str("...");
    }
    Some(snippet)
}
