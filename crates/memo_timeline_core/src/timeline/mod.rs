//! Global memo timeline: scan, aggregate, filter and cache.
//!
//! # Responsibility
//! - Turn the whole collection into one newest-first memo sequence.
//! - Select date windows over that sequence and keep it cached.
//!
//! # Invariants
//! - Order is `timestamp DESC, record_id ASC, position ASC` everywhere.
//! - Calendar dates are derived in the caller-supplied time zone.

use chrono::{DateTime, NaiveDate, TimeZone};
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::store::StoreError;

pub mod aggregator;
pub mod cache;
pub mod filter;
pub mod scanner;

/// Failures of one scan/aggregate cycle.
#[derive(Debug)]
pub enum TimelineError {
    /// The store could not enumerate records; the cached result is kept.
    Store(StoreError),
    /// The cycle was cancelled cooperatively.
    Cancelled,
}

impl Display for TimelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "timeline scan failed: {err}"),
            Self::Cancelled => write!(f, "timeline scan cancelled"),
        }
    }
}

impl Error for TimelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Cancelled => None,
        }
    }
}

impl From<StoreError> for TimelineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Local calendar date of an epoch-seconds timestamp.
///
/// Timestamps outside chrono's range clamp to the earliest/latest date.
pub fn local_date<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> NaiveDate {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(utc) => utc.with_timezone(tz).date_naive(),
        None if timestamp < 0 => NaiveDate::MIN,
        None => NaiveDate::MAX,
    }
}
