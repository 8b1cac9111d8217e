use chrono::Utc;
use memo_timeline_core::{
    CollectionStore, MemoryCollectionStore, ProgressCallback, RecordId, RecordRef, ScanOptions,
    ScanProgress, StoreError, StoreResult, TimelineCache, TimelineError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const FIELD: &str = "_MemoLog";

#[derive(Default)]
struct Gate {
    closed: bool,
    blocked_readers: usize,
}

/// Memory store whose field reads can be held and whose queries can fail or panic.
#[derive(Default)]
struct ControlledStore {
    inner: MemoryCollectionStore,
    gate: Mutex<Gate>,
    gate_changed: Condvar,
    fail_queries: AtomicBool,
    panic_queries: AtomicBool,
}

impl ControlledStore {
    fn with_records(records: &[(RecordId, &str)]) -> Arc<Self> {
        let store = Self::default();
        for (record_id, raw) in records {
            store.inner.insert_record(*record_id, None, [(FIELD, *raw)]);
        }
        Arc::new(store)
    }

    fn close_gate(&self) {
        self.gate.lock().unwrap().closed = true;
    }

    fn open_gate(&self) {
        self.gate.lock().unwrap().closed = false;
        self.gate_changed.notify_all();
    }

    fn wait_for_blocked_reader(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.gate.lock().unwrap().blocked_readers == 0 {
            assert!(Instant::now() < deadline, "refresh never reached the store");
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl CollectionStore for ControlledStore {
    fn query_records_with_field(&self, field: &str) -> StoreResult<Vec<RecordId>> {
        if self.panic_queries.load(Ordering::SeqCst) {
            panic!("collection store crashed");
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("collection closed".to_string()));
        }
        self.inner.query_records_with_field(field)
    }

    fn read_field(&self, record_id: RecordId, field: &str) -> StoreResult<String> {
        let mut gate = self.gate.lock().unwrap();
        gate.blocked_readers += 1;
        while gate.closed {
            gate = self.gate_changed.wait(gate).unwrap();
        }
        gate.blocked_readers -= 1;
        drop(gate);
        self.inner.read_field(record_id, field)
    }

    fn write_field(&self, record_id: RecordId, field: &str, raw: &str) -> StoreResult<()> {
        self.inner.write_field(record_id, field, raw)
    }

    fn resolve_record(&self, record_id: RecordId) -> StoreResult<RecordRef> {
        self.inner.resolve_record(record_id)
    }
}

fn cache_over(store: &Arc<ControlledStore>) -> TimelineCache<ControlledStore, Utc> {
    let mut options = ScanOptions::new(FIELD);
    options.batch_size = 1;
    TimelineCache::new(Arc::clone(store), options, Utc)
}

#[test]
fn outdated_refresh_result_is_discarded() {
    let store = ControlledStore::with_records(&[(1, r#"[{"ts":1,"text":"a"}]"#)]);
    let cache = cache_over(&store);
    assert_eq!(cache.get(false).unwrap().timeline.len(), 1);

    store.close_gate();
    cache.invalidate();
    assert!(cache.get(false).unwrap().stale);
    store.wait_for_blocked_reader();

    store
        .inner
        .insert_record(2, None, [(FIELD, r#"[{"ts":2,"text":"b"}]"#)]);
    cache.invalidate();
    store.open_gate();
    cache.wait_for_refresh();

    let after_discard = cache.peek().unwrap();
    assert!(after_discard.stale);
    assert_eq!(after_discard.built_epoch, 0);
    assert_eq!(after_discard.timeline.len(), 1);

    cache.get(false).unwrap();
    cache.wait_for_refresh();
    let fresh = cache.get(false).unwrap();
    assert!(!fresh.stale);
    assert_eq!(fresh.built_epoch, 2);
    assert_eq!(fresh.timeline.len(), 2);
}

#[test]
fn cancelled_refresh_keeps_previous_result() {
    let store = ControlledStore::with_records(&[
        (1, r#"[{"ts":1,"text":"a"}]"#),
        (2, r#"[{"ts":2,"text":"b"}]"#),
    ]);
    let cache = cache_over(&store);
    let before = cache.get(false).unwrap();

    store.close_gate();
    cache.invalidate();
    cache.get(false).unwrap();
    store.wait_for_blocked_reader();
    assert!(cache.is_refreshing());
    assert!(cache.cancel_refresh());
    store.open_gate();
    cache.wait_for_refresh();

    let after = cache.peek().unwrap();
    assert!(Arc::ptr_eq(&before.timeline, &after.timeline));
    assert!(after.stale);
    assert!(!cache.is_refreshing());
}

#[test]
fn enumeration_failure_leaves_cache_intact() {
    let store = ControlledStore::with_records(&[(1, r#"[{"ts":1,"text":"a"}]"#)]);
    let cache = cache_over(&store);
    let before = cache.get(false).unwrap();

    store.fail_queries.store(true, Ordering::SeqCst);
    let err = cache.get(true).unwrap_err();
    assert!(matches!(err, TimelineError::Store(StoreError::Unavailable(_))));

    cache.invalidate();
    assert!(cache.get(false).unwrap().stale);
    cache.wait_for_refresh();
    let after = cache.peek().unwrap();
    assert!(Arc::ptr_eq(&before.timeline, &after.timeline));
}

#[test]
fn cold_cache_failure_is_reported() {
    let store = ControlledStore::with_records(&[]);
    store.fail_queries.store(true, Ordering::SeqCst);
    let cache = cache_over(&store);

    assert!(cache.get(false).is_err());
    assert!(cache.peek().is_none());
}

#[test]
fn progress_is_reported_for_cache_scans() {
    let store = ControlledStore::with_records(&[
        (1, r#"[{"ts":1,"text":"a"}]"#),
        (2, r#"[{"ts":2,"text":"b"}]"#),
        (3, r#"[{"ts":3,"text":"c"}]"#),
    ]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress: Arc<ProgressCallback> =
        Arc::new(move |p: ScanProgress| sink.lock().unwrap().push(p.done));
    let cache = cache_over(&store).with_progress(progress);

    cache.get(true).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn panicked_refresh_frees_the_slot_for_the_next_one() {
    let store = ControlledStore::with_records(&[(1, r#"[{"ts":1,"text":"a"}]"#)]);
    let cache = cache_over(&store);
    let first = cache.get(false).unwrap();

    store.panic_queries.store(true, Ordering::SeqCst);
    cache.invalidate();
    assert!(cache.get(false).unwrap().stale);
    cache.wait_for_refresh();
    assert!(!cache.is_refreshing());
    assert!(Arc::ptr_eq(&cache.peek().unwrap().timeline, &first.timeline));

    store.panic_queries.store(false, Ordering::SeqCst);
    store
        .inner
        .write_field(1, FIELD, r#"[{"ts":1,"text":"a"},{"ts":2,"text":"b"}]"#)
        .unwrap();
    assert!(cache.get(false).unwrap().stale);
    cache.wait_for_refresh();

    let snapshot = cache.get(false).unwrap();
    assert!(!snapshot.stale);
    assert_eq!(snapshot.timeline.len(), 2);
}
