//! Collection scanner.
//!
//! # Responsibility
//! - Enumerate records holding memo content and read their raw field text.
//! - Report progress per batch and stop cooperatively on cancellation.
//!
//! # Invariants
//! - Read-only: the scanner never writes to the store.
//! - Cancellation is checked between batches only.
//! - A record that cannot be read is skipped and counted, never fatal.

use crate::model::memo::RecordId;
use crate::model::timeline::RecordContext;
use crate::store::{CollectionStore, StoreError, StoreResult};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Records read per batch unless configured otherwise.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

/// Cooperative cancellation flag shared between a scan and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Batch progress of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    /// Records processed so far, skipped ones included.
    pub done: usize,
    pub total: usize,
}

/// Progress sink invoked after each batch.
pub type ProgressCallback = dyn Fn(ScanProgress) + Send + Sync;

/// Raw memo field of one record, as read during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    pub record_id: RecordId,
    pub raw: String,
    pub context: Option<Arc<RecordContext>>,
}

impl From<(RecordId, String)> for ScannedRecord {
    fn from((record_id, raw): (RecordId, String)) -> Self {
        Self {
            record_id,
            raw,
            context: None,
        }
    }
}

impl From<(RecordId, &str)> for ScannedRecord {
    fn from((record_id, raw): (RecordId, &str)) -> Self {
        Self::from((record_id, raw.to_string()))
    }
}

/// Tally returned once a scan stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub yielded: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Scan parameters.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub field: String,
    pub batch_size: usize,
    /// Also fetch deck/snippet context for each record.
    pub with_context: bool,
}

impl ScanOptions {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            batch_size: DEFAULT_SCAN_BATCH_SIZE,
            with_context: true,
        }
    }
}

/// Lazy, finite sequence of scanned records.
///
/// Iteration ends when every record was visited or the token was cancelled;
/// a cancelled scan cannot be resumed. Call [`RecordScan::summary`] after
/// iteration for the skipped tally and the cancellation flag.
pub struct RecordScan<'a, S: CollectionStore + ?Sized> {
    store: &'a S,
    options: &'a ScanOptions,
    cancel: &'a CancellationToken,
    progress: Option<&'a ProgressCallback>,
    record_ids: Vec<RecordId>,
    next_index: usize,
    batch: VecDeque<ScannedRecord>,
    summary: ScanSummary,
    finished: bool,
}

/// Starts a scan over all records with non-blank memo content.
///
/// # Errors
/// - `StoreError` when the store cannot enumerate records. Per-record read
///   failures are not errors; they increment `ScanSummary::skipped`.
pub fn scan<'a, S: CollectionStore + ?Sized>(
    store: &'a S,
    options: &'a ScanOptions,
    progress: Option<&'a ProgressCallback>,
    cancel: &'a CancellationToken,
) -> StoreResult<RecordScan<'a, S>> {
    let record_ids = store.query_records_with_field(&options.field)?;
    debug!(
        "event=scan_start module=timeline status=start total={} batch_size={}",
        record_ids.len(),
        options.batch_size
    );
    Ok(RecordScan {
        store,
        options,
        cancel,
        progress,
        summary: ScanSummary {
            total: record_ids.len(),
            ..ScanSummary::default()
        },
        record_ids,
        next_index: 0,
        batch: VecDeque::new(),
        finished: false,
    })
}

impl<S: CollectionStore + ?Sized> RecordScan<'_, S> {
    pub fn summary(&self) -> ScanSummary {
        self.summary
    }

    fn load_next_batch(&mut self) -> bool {
        if self.next_index >= self.record_ids.len() {
            return false;
        }
        if self.cancel.is_cancelled() {
            self.summary.cancelled = true;
            debug!(
                "event=scan_stop module=timeline status=cancelled done={} total={}",
                self.next_index, self.summary.total
            );
            return false;
        }

        let batch_size = self.options.batch_size.max(1);
        let end = (self.next_index + batch_size).min(self.record_ids.len());
        for &record_id in &self.record_ids[self.next_index..end] {
            match self.read_record(record_id) {
                Ok(record) => self.batch.push_back(record),
                Err(err) => {
                    self.summary.skipped += 1;
                    warn!(
                        "event=scan_record module=timeline status=skipped record_id={record_id} error={err}"
                    );
                }
            }
        }
        self.next_index = end;

        if let Some(progress) = self.progress {
            progress(ScanProgress {
                done: self.next_index,
                total: self.summary.total,
            });
        }
        true
    }

    fn read_record(&self, record_id: RecordId) -> Result<ScannedRecord, StoreError> {
        let raw = self.store.read_field(record_id, &self.options.field)?;
        let context = if self.options.with_context {
            match self.store.record_context(record_id) {
                Ok(context) => context.map(Arc::new),
                Err(err) => {
                    debug!(
                        "event=scan_context module=timeline status=skipped record_id={record_id} error={err}"
                    );
                    None
                }
            }
        } else {
            None
        };
        Ok(ScannedRecord {
            record_id,
            raw,
            context,
        })
    }
}

impl<S: CollectionStore + ?Sized> Iterator for RecordScan<'_, S> {
    type Item = ScannedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.batch.pop_front() {
                self.summary.yielded += 1;
                return Some(record);
            }
            if self.finished {
                return None;
            }
            if !self.load_next_batch() {
                self.finished = true;
            }
        }
    }
}
