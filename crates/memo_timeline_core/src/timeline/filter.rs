//! Date-window filtering and display cap.
//!
//! # Invariants
//! - Filtering is a predicate selection; it never reorders.
//! - Windows compare local calendar dates of `now`'s time zone, so day
//!   boundaries follow the local clock, DST changes included.
//! - The display cap is applied after filtering and keeps the newest entries.

use crate::model::timeline::{FilterError, FilterSpec, TimelineEntry};
use crate::timeline::local_date;
use chrono::{DateTime, Days, NaiveDate, TimeZone};

/// Inclusive local-date window selected by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Resolves a filter into an inclusive date window, `None` for `All`.
///
/// # Errors
/// - `FilterError::InvalidRange` for a custom range with `from > to`.
pub fn resolve_window<Tz: TimeZone>(
    spec: FilterSpec,
    now: &DateTime<Tz>,
) -> Result<Option<DateWindow>, FilterError> {
    spec.validate()?;
    let today = now.date_naive();
    let window = match spec {
        FilterSpec::All => None,
        FilterSpec::Today => Some(DateWindow {
            from: today,
            to: today,
        }),
        FilterSpec::Last7Days => Some(trailing_days(today, 7)),
        FilterSpec::Last30Days => Some(trailing_days(today, 30)),
        FilterSpec::Custom { from, to } => Some(DateWindow { from, to }),
    };
    Ok(window)
}

fn trailing_days(today: NaiveDate, days: u64) -> DateWindow {
    let from = today
        .checked_sub_days(Days::new(days - 1))
        .unwrap_or(NaiveDate::MIN);
    DateWindow { from, to: today }
}

/// Selects entries matching `spec`, keeping their relative order.
///
/// # Errors
/// - `FilterError::InvalidRange`, raised before any entry is inspected.
pub fn filter_entries<'a, I, Tz>(
    entries: I,
    spec: FilterSpec,
    now: &DateTime<Tz>,
) -> Result<Vec<&'a TimelineEntry>, FilterError>
where
    I: IntoIterator<Item = &'a TimelineEntry>,
    Tz: TimeZone,
{
    let window = resolve_window(spec, now)?;
    let tz = now.timezone();
    Ok(entries
        .into_iter()
        .filter(|entry| match window {
            None => true,
            Some(window) => window.contains(local_date(entry.memo.timestamp, &tz)),
        })
        .collect())
}

/// Keeps the `max_display_memos` newest entries of a timeline-ordered slice.
///
/// Returns whether entries were dropped.
pub fn apply_display_cap<T>(entries: &mut Vec<T>, max_display_memos: usize) -> bool {
    if entries.len() > max_display_memos {
        entries.truncate(max_display_memos);
        true
    } else {
        false
    }
}
