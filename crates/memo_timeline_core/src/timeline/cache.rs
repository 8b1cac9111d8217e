//! Timeline cache with epoch-based invalidation.
//!
//! # Responsibility
//! - Serve the last aggregated timeline without waiting for a rescan.
//! - Refresh in the background after invalidation, one refresh at a time.
//!
//! # Invariants
//! - `invalidate()` only advances the epoch; the next `get` starts a scan.
//! - A result is installed only when no newer invalidation happened while
//!   it was built (a cold cache accepts any result, tagged stale).
//! - Cancelled, failed or panicked refreshes leave the cached timeline
//!   untouched and free the refresh slot.
//! - Snapshot and task state sit behind one mutex; the epoch is an atomic
//!   counter so mutations can bump it without touching that mutex.

use crate::store::CollectionStore;
use crate::timeline::aggregator::{build_timeline, Timeline};
use crate::timeline::scanner::{CancellationToken, ProgressCallback, ScanOptions};
use crate::timeline::TimelineError;
use chrono::TimeZone;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const REFRESH_THREAD_NAME: &str = "memo-timeline-refresh";

/// Shared invalidation counter.
///
/// Cloned into mutation services so a committed write can mark the cached
/// timeline stale without holding any cache lock.
#[derive(Debug, Clone, Default)]
pub struct CacheEpoch(Arc<AtomicU64>);

impl CacheEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Advances the epoch and returns the new value.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Timeline returned by [`TimelineCache::get`].
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub timeline: Arc<Timeline>,
    /// An invalidation happened after this timeline was built.
    pub stale: bool,
    /// Epoch the timeline was built for.
    pub built_epoch: u64,
}

struct RefreshTask {
    task_id: u64,
    epoch: u64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<Timeline>>,
    built_epoch: u64,
    refresh: Option<RefreshTask>,
    next_task_id: u64,
}

impl CacheState {
    fn install(&mut self, epoch: u64, current_epoch: u64, timeline: &Arc<Timeline>) -> bool {
        let cold = self.snapshot.is_none();
        if !cold && (epoch != current_epoch || epoch < self.built_epoch) {
            return false;
        }
        self.snapshot = Some(Arc::clone(timeline));
        self.built_epoch = epoch;
        true
    }
}

/// Frees the refresh slot of one task, also when its scan unwinds.
struct RefreshSlot<'a> {
    state: &'a Mutex<CacheState>,
    task_id: u64,
}

impl Drop for RefreshSlot<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state
            .refresh
            .as_ref()
            .is_some_and(|task| task.task_id == self.task_id)
        {
            state.refresh = None;
        }
    }
}

struct CacheShared<S, Tz> {
    store: Arc<S>,
    tz: Tz,
    options: ScanOptions,
    progress: Option<Arc<ProgressCallback>>,
    epoch: CacheEpoch,
    state: Mutex<CacheState>,
}

impl<S, Tz> CacheShared<S, Tz>
where
    S: CollectionStore + Send + Sync + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    fn build(&self, cancel: &CancellationToken) -> Result<Timeline, TimelineError> {
        build_timeline(
            self.store.as_ref(),
            &self.options,
            self.progress.as_deref(),
            cancel,
            &self.tz,
        )
    }

    fn run_refresh(&self, task_id: u64, epoch: u64, cancel: &CancellationToken) {
        let slot = RefreshSlot {
            state: &self.state,
            task_id,
        };
        let result = self.build(cancel);
        drop(slot);
        let mut state = self.state.lock();

        match result {
            Ok(timeline) => {
                let timeline = Arc::new(timeline);
                let current = self.epoch.current();
                if state.install(epoch, current, &timeline) {
                    info!(
                        "event=cache_refresh module=timeline status=ok epoch={epoch} memos={}",
                        timeline.len()
                    );
                } else {
                    info!(
                        "event=cache_refresh module=timeline status=discarded epoch={epoch} current_epoch={current}"
                    );
                }
            }
            Err(TimelineError::Cancelled) => {
                info!("event=cache_refresh module=timeline status=cancelled epoch={epoch}");
            }
            Err(err) => {
                error!(
                    "event=cache_refresh module=timeline status=error error_code=scan_failed epoch={epoch} error={err}"
                );
            }
        }
    }
}

/// Cached global timeline over one collection store.
pub struct TimelineCache<S, Tz> {
    shared: Arc<CacheShared<S, Tz>>,
}

impl<S, Tz> TimelineCache<S, Tz>
where
    S: CollectionStore + Send + Sync + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Creates a cold cache; the first `get` blocks on a full scan.
    pub fn new(store: Arc<S>, options: ScanOptions, tz: Tz) -> Self {
        Self::with_epoch(store, options, tz, CacheEpoch::new())
    }

    /// Creates a cache sharing an existing epoch counter.
    pub fn with_epoch(store: Arc<S>, options: ScanOptions, tz: Tz, epoch: CacheEpoch) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                store,
                tz,
                options,
                progress: None,
                epoch,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Installs a progress sink for scans started by this cache.
    ///
    /// Must be called before the cache is shared with other threads.
    pub fn with_progress(mut self, progress: Arc<ProgressCallback>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.progress = Some(progress),
            None => warn!("event=cache_config module=timeline status=skipped reason=shared"),
        }
        self
    }

    /// Handle used by mutation paths to invalidate this cache.
    pub fn epoch(&self) -> CacheEpoch {
        self.shared.epoch.clone()
    }

    /// Marks the cached timeline stale; returns the new epoch.
    pub fn invalidate(&self) -> u64 {
        let epoch = self.shared.epoch.bump();
        debug!("event=cache_invalidate module=timeline status=ok epoch={epoch}");
        epoch
    }

    /// Returns the cached timeline, refreshing as needed.
    ///
    /// - Warm cache, `force_refresh == false`: returns immediately. When stale,
    ///   a background refresh is started unless one is already running.
    /// - Cold cache or `force_refresh == true`: scans on the calling thread.
    ///
    /// # Errors
    /// - `TimelineError::Store` when a blocking scan cannot enumerate records;
    ///   the previously cached timeline stays in place.
    pub fn get(&self, force_refresh: bool) -> Result<CacheSnapshot, TimelineError> {
        if !force_refresh {
            let mut state = self.shared.state.lock();
            if let Some(timeline) = state.snapshot.clone() {
                let stale = state.built_epoch != self.shared.epoch.current();
                if stale {
                    self.spawn_refresh(&mut state);
                }
                return Ok(CacheSnapshot {
                    timeline,
                    stale,
                    built_epoch: state.built_epoch,
                });
            }
        }
        self.refresh_blocking()
    }

    /// Returns the cached timeline without starting any scan.
    pub fn peek(&self) -> Option<CacheSnapshot> {
        let state = self.shared.state.lock();
        state.snapshot.clone().map(|timeline| CacheSnapshot {
            timeline,
            stale: state.built_epoch != self.shared.epoch.current(),
            built_epoch: state.built_epoch,
        })
    }

    /// Cancels the running background refresh, if any.
    pub fn cancel_refresh(&self) -> bool {
        let state = self.shared.state.lock();
        match state.refresh.as_ref() {
            Some(task) => {
                task.cancel.cancel();
                debug!(
                    "event=cache_refresh module=timeline status=cancel_requested epoch={}",
                    task.epoch
                );
                true
            }
            None => false,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.state.lock().refresh.is_some()
    }

    /// Blocks until the running background refresh, if any, has finished.
    pub fn wait_for_refresh(&self) {
        let handle = self
            .shared
            .state
            .lock()
            .refresh
            .as_mut()
            .and_then(|task| task.handle.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("event=cache_refresh module=timeline status=error error_code=refresh_panicked");
            }
        }
    }

    fn refresh_blocking(&self) -> Result<CacheSnapshot, TimelineError> {
        let epoch = self.shared.epoch.current();
        let cancel = CancellationToken::new();
        let timeline = Arc::new(self.shared.build(&cancel)?);

        let mut state = self.shared.state.lock();
        let current = self.shared.epoch.current();
        let installed = state.install(epoch, current, &timeline);
        debug!(
            "event=cache_refresh module=timeline status=ok mode=blocking epoch={epoch} installed={installed}"
        );
        Ok(CacheSnapshot {
            timeline,
            stale: epoch != current,
            built_epoch: epoch,
        })
    }

    fn spawn_refresh(&self, state: &mut CacheState) {
        if state.refresh.is_some() {
            return;
        }
        let epoch = self.shared.epoch.current();
        let task_id = state.next_task_id;
        state.next_task_id += 1;
        let cancel = CancellationToken::new();

        let shared = Arc::clone(&self.shared);
        let task_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name(REFRESH_THREAD_NAME.to_string())
            .spawn(move || shared.run_refresh(task_id, epoch, &task_cancel));

        match spawned {
            Ok(handle) => {
                debug!("event=cache_refresh module=timeline status=start mode=background epoch={epoch}");
                state.refresh = Some(RefreshTask {
                    task_id,
                    epoch,
                    cancel,
                    handle: Some(handle),
                });
            }
            Err(err) => {
                error!(
                    "event=cache_refresh module=timeline status=error error_code=spawn_failed epoch={epoch} error={err}"
                );
            }
        }
    }
}

impl<S, Tz> Drop for TimelineCache<S, Tz> {
    fn drop(&mut self) {
        if let Some(task) = self.shared.state.lock().refresh.as_ref() {
            task.cancel.cancel();
        }
    }
}
