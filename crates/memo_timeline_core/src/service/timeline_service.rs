//! Timeline read use-cases.
//!
//! # Responsibility
//! - Turn the cached global timeline into filtered, capped day buckets.
//! - Render the current view for export.
//!
//! # Invariants
//! - Filters are validated before the cache is touched.
//! - The display cap bounds the returned view only; the cached timeline
//!   always holds every memo.

use crate::export::{self, ExportError, ExportFormat};
use crate::model::memo::DisplayConfig;
use crate::model::timeline::{DateBucket, FilterError, FilterSpec};
use crate::store::CollectionStore;
use crate::timeline::aggregator::bucket_by_day;
use crate::timeline::cache::{CacheEpoch, TimelineCache};
use crate::timeline::filter::{apply_display_cap, filter_entries};
use crate::timeline::TimelineError;
use chrono::{DateTime, Local, TimeZone, Utc};
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Service error for timeline reads.
#[derive(Debug)]
pub enum TimelineServiceError {
    Filter(FilterError),
    Timeline(TimelineError),
    Export(ExportError),
}

impl Display for TimelineServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filter(err) => write!(f, "{err}"),
            Self::Timeline(err) => write!(f, "{err}"),
            Self::Export(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TimelineServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Filter(err) => Some(err),
            Self::Timeline(err) => Some(err),
            Self::Export(err) => Some(err),
        }
    }
}

impl From<FilterError> for TimelineServiceError {
    fn from(value: FilterError) -> Self {
        Self::Filter(value)
    }
}

impl From<TimelineError> for TimelineServiceError {
    fn from(value: TimelineError) -> Self {
        Self::Timeline(value)
    }
}

impl From<ExportError> for TimelineServiceError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

/// Filtered, capped projection of the global timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineView {
    /// Newest day first; at most `max_display_memos` entries in total.
    pub buckets: Vec<DateBucket>,
    /// Built before the latest invalidation; a refresh may be running.
    pub stale: bool,
    /// Entries matching the filter before the display cap.
    pub total_matching: usize,
    pub truncated: bool,
    /// Records excluded because their memo log is malformed.
    pub parse_error_count: usize,
    /// Records that could not be read during the scan.
    pub skipped: usize,
}

impl TimelineView {
    pub fn entry_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.entries.len()).sum()
    }
}

/// Timeline facade over a cache.
pub struct TimelineService<S, Tz = Local> {
    cache: TimelineCache<S, Tz>,
    display: DisplayConfig,
    tz: Tz,
}

impl<S, Tz> TimelineService<S, Tz>
where
    S: CollectionStore + Send + Sync + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Creates a service; `tz` decides local calendar days.
    pub fn new(cache: TimelineCache<S, Tz>, display: DisplayConfig, tz: Tz) -> Self {
        Self { cache, display, tz }
    }

    /// Builds the view for `spec` as seen at `now`.
    ///
    /// # Errors
    /// - `Filter` for an invalid custom range, before any scan.
    /// - `Timeline` when a blocking scan cannot enumerate records.
    pub fn view(
        &self,
        spec: FilterSpec,
        now: &DateTime<Tz>,
        force_refresh: bool,
    ) -> Result<TimelineView, TimelineServiceError> {
        spec.validate()?;
        let snapshot = self.cache.get(force_refresh)?;
        let mut matching = filter_entries(snapshot.timeline.entries(), spec, now)?;
        let total_matching = matching.len();
        let truncated = apply_display_cap(&mut matching, self.display.max_display_memos);
        let buckets = bucket_by_day(matching.into_iter().cloned(), &now.timezone());

        debug!(
            "event=timeline_view module=service status=ok filter={spec:?} matching={total_matching} truncated={truncated} stale={}",
            snapshot.stale
        );
        Ok(TimelineView {
            buckets,
            stale: snapshot.stale,
            total_matching,
            truncated,
            parse_error_count: snapshot.timeline.parse_errors().len(),
            skipped: snapshot.timeline.scan_summary().skipped,
        })
    }

    /// Builds the view as seen at the current instant.
    pub fn view_now(
        &self,
        spec: FilterSpec,
        force_refresh: bool,
    ) -> Result<TimelineView, TimelineServiceError> {
        let now = Utc::now().with_timezone(&self.tz);
        self.view(spec, &now, force_refresh)
    }

    /// Renders the current view for `spec`.
    pub fn render(
        &self,
        spec: FilterSpec,
        now: &DateTime<Tz>,
        format: ExportFormat,
    ) -> Result<String, TimelineServiceError> {
        let view = self.view(spec, now, false)?;
        Ok(export::render(&view.buckets, format))
    }

    /// Renders the current view for `spec` into `path`.
    pub fn export_to_path(
        &self,
        spec: FilterSpec,
        now: &DateTime<Tz>,
        format: ExportFormat,
        path: impl AsRef<Path>,
    ) -> Result<TimelineView, TimelineServiceError> {
        let view = self.view(spec, now, false)?;
        export::export_to_path(&view.buckets, format, path)?;
        Ok(view)
    }

    pub fn invalidate(&self) -> u64 {
        self.cache.invalidate()
    }

    pub fn cancel_refresh(&self) -> bool {
        self.cache.cancel_refresh()
    }

    pub fn epoch(&self) -> CacheEpoch {
        self.cache.epoch()
    }

    pub fn cache(&self) -> &TimelineCache<S, Tz> {
        &self.cache
    }
}
