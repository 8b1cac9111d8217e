//! Timeline aggregation.
//!
//! # Responsibility
//! - Decode scanned records and tag each memo with its owning record.
//! - Produce one globally sorted sequence and its per-day buckets.
//!
//! # Invariants
//! - One stable sort after the input is exhausted.
//! - A malformed record is reported and excluded; it never blocks the rest.
//! - Concatenating `Timeline::buckets()` yields the sorted sequence.

use crate::codec::{self, ParseError};
use crate::model::memo::RecordId;
use crate::model::timeline::{DateBucket, TimelineEntry};
use crate::store::CollectionStore;
use crate::timeline::scanner::{
    scan, CancellationToken, ProgressCallback, ScanOptions, ScanSummary, ScannedRecord,
};
use crate::timeline::{local_date, TimelineError};
use chrono::TimeZone;
use log::{info, warn};
use std::time::Instant;

/// Sorted entries plus per-record decode failures.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub entries: Vec<TimelineEntry>,
    pub parse_errors: Vec<(RecordId, ParseError)>,
}

/// Decodes and merges scanned records into the global order.
pub fn aggregate<I>(records: I) -> Aggregation
where
    I: IntoIterator,
    I::Item: Into<ScannedRecord>,
{
    let mut aggregation = Aggregation::default();
    for record in records {
        let ScannedRecord {
            record_id,
            raw,
            context,
        } = record.into();
        match codec::decode(&raw) {
            Ok(log) => {
                aggregation.entries.extend(
                    log.into_memos()
                        .into_iter()
                        .enumerate()
                        .map(|(position, memo)| TimelineEntry {
                            memo,
                            record_id,
                            position,
                            context: context.clone(),
                        }),
                );
            }
            Err(err) => {
                warn!(
                    "event=aggregate_record module=timeline status=error error_code=parse_failed record_id={record_id} reason={}",
                    err.reason
                );
                aggregation.parse_errors.push((record_id, err));
            }
        }
    }
    aggregation.entries.sort_by(TimelineEntry::timeline_cmp);
    aggregation
}

/// Groups sorted entries by local calendar date, newest day first.
///
/// Input must already be in timeline order; buckets keep that order.
pub fn bucket_by_day<Tz: TimeZone>(
    entries: impl IntoIterator<Item = TimelineEntry>,
    tz: &Tz,
) -> Vec<DateBucket> {
    let mut buckets: Vec<DateBucket> = Vec::new();
    for entry in entries {
        let date = local_date(entry.memo.timestamp, tz);
        match buckets.last_mut() {
            Some(bucket) if bucket.date == date => bucket.entries.push(entry),
            _ => buckets.push(DateBucket {
                date,
                entries: vec![entry],
            }),
        }
    }
    buckets
}

/// Result of one full scan + aggregate cycle.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    buckets: Vec<DateBucket>,
    parse_errors: Vec<(RecordId, ParseError)>,
    scan: ScanSummary,
    len: usize,
}

impl Timeline {
    pub fn from_aggregation<Tz: TimeZone>(
        aggregation: Aggregation,
        scan: ScanSummary,
        tz: &Tz,
    ) -> Self {
        let len = aggregation.entries.len();
        Self {
            buckets: bucket_by_day(aggregation.entries, tz),
            parse_errors: aggregation.parse_errors,
            scan,
            len,
        }
    }

    pub fn buckets(&self) -> &[DateBucket] {
        &self.buckets
    }

    /// Entries in global timeline order.
    pub fn entries(&self) -> impl Iterator<Item = &TimelineEntry> + '_ {
        self.buckets.iter().flat_map(|bucket| bucket.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn parse_errors(&self) -> &[(RecordId, ParseError)] {
        &self.parse_errors
    }

    pub fn scan_summary(&self) -> ScanSummary {
        self.scan
    }
}

/// Runs scan + aggregate against a store.
///
/// # Errors
/// - `TimelineError::Store` when records cannot be enumerated.
/// - `TimelineError::Cancelled` when `cancel` fired before the scan finished.
pub fn build_timeline<S, Tz>(
    store: &S,
    options: &ScanOptions,
    progress: Option<&ProgressCallback>,
    cancel: &CancellationToken,
    tz: &Tz,
) -> Result<Timeline, TimelineError>
where
    S: CollectionStore + ?Sized,
    Tz: TimeZone,
{
    let started_at = Instant::now();
    let mut records = scan(store, options, progress, cancel)?;
    let aggregation = aggregate(records.by_ref());
    let summary = records.summary();
    if summary.cancelled {
        info!(
            "event=timeline_build module=timeline status=cancelled done={} total={}",
            summary.yielded + summary.skipped,
            summary.total
        );
        return Err(TimelineError::Cancelled);
    }

    let timeline = Timeline::from_aggregation(aggregation, summary, tz);
    info!(
        "event=timeline_build module=timeline status=ok records={} memos={} parse_errors={} skipped={} duration_ms={}",
        summary.yielded,
        timeline.len(),
        timeline.parse_errors().len(),
        summary.skipped,
        started_at.elapsed().as_millis()
    );
    Ok(timeline)
}
