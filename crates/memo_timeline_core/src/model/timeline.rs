//! Timeline projection types.
//!
//! # Responsibility
//! - Describe memos tagged with their owning record for cross-record views.
//! - Describe day buckets and filter selections over the global timeline.
//!
//! # Invariants
//! - `TimelineEntry::position` is the memo's index in its log at scan time.
//! - `FilterSpec::Custom` is only valid with `from <= to`.

use crate::model::memo::{MemoId, MemoRecord, RecordId};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Display context of a record, shared by all its timeline entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordContext {
    /// Name of the deck/collection section holding the record.
    pub deck_name: Option<String>,
    /// Plain-text excerpt of the record's first field.
    pub snippet: Option<String>,
}

/// Navigable reference returned by the store for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub record_id: RecordId,
    /// Host search string that selects exactly this record.
    pub search: String,
}

impl RecordRef {
    pub fn for_record(record_id: RecordId) -> Self {
        Self {
            record_id,
            search: format!("nid:{record_id}"),
        }
    }
}

/// One memo tagged with the record that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub memo: MemoRecord,
    pub record_id: RecordId,
    pub position: usize,
    pub context: Option<Arc<RecordContext>>,
}

impl TimelineEntry {
    /// Globally unique key of this entry.
    pub fn key(&self) -> (RecordId, &MemoId) {
        (self.record_id, &self.memo.id)
    }

    /// Global timeline order: newest first, then record id, then log position.
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        other
            .memo
            .timestamp
            .cmp(&self.memo.timestamp)
            .then_with(|| self.record_id.cmp(&other.record_id))
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// Entries of one local calendar day, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateBucket {
    pub date: NaiveDate,
    pub entries: Vec<TimelineEntry>,
}

/// Date-range selection applied to the global timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSpec {
    All,
    Today,
    Last7Days,
    Last30Days,
    Custom { from: NaiveDate, to: NaiveDate },
}

/// Filter specification errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Custom range with `from` after `to`.
    InvalidRange { from: NaiveDate, to: NaiveDate },
    /// Unknown filter keyword.
    UnknownFilter(String),
}

impl Display for FilterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRange { from, to } => {
                write!(f, "invalid custom range: from {from} is after to {to}")
            }
            Self::UnknownFilter(value) => {
                write!(f, "unknown filter `{value}`; expected all|today|7|30")
            }
        }
    }
}

impl Error for FilterError {}

impl FilterSpec {
    /// Builds a validated custom range.
    pub fn custom(from: NaiveDate, to: NaiveDate) -> Result<Self, FilterError> {
        let spec = Self::Custom { from, to };
        spec.validate()?;
        Ok(spec)
    }

    /// Rejects ranges that would silently select nothing.
    pub fn validate(&self) -> Result<(), FilterError> {
        match *self {
            Self::Custom { from, to } if from > to => Err(FilterError::InvalidRange { from, to }),
            _ => Ok(()),
        }
    }

    /// Parses the keyword form used by configuration and CLI (`all|today|7|30`).
    pub fn parse_keyword(value: &str) -> Result<Self, FilterError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "today" => Ok(Self::Today),
            "7" | "last7" | "last7days" => Ok(Self::Last7Days),
            "30" | "last30" | "last30days" => Ok(Self::Last30Days),
            other => Err(FilterError::UnknownFilter(other.to_string())),
        }
    }
}
