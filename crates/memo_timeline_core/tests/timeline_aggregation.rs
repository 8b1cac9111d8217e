use chrono::Utc;
use memo_timeline_core::{
    aggregate, build_timeline, CancellationToken, CollectionStore, MemoryCollectionStore,
    RecordContext, RecordId, RecordRef, ScanOptions, StoreResult,
};

/// Drops one record between enumeration and the field read.
struct VanishingStore {
    inner: MemoryCollectionStore,
    vanishing: RecordId,
}

impl CollectionStore for VanishingStore {
    fn query_records_with_field(&self, field: &str) -> StoreResult<Vec<RecordId>> {
        let ids = self.inner.query_records_with_field(field)?;
        self.inner.remove_record(self.vanishing);
        Ok(ids)
    }

    fn read_field(&self, record_id: RecordId, field: &str) -> StoreResult<String> {
        self.inner.read_field(record_id, field)
    }

    fn write_field(&self, record_id: RecordId, field: &str, raw: &str) -> StoreResult<()> {
        self.inner.write_field(record_id, field, raw)
    }

    fn resolve_record(&self, record_id: RecordId) -> StoreResult<RecordRef> {
        self.inner.resolve_record(record_id)
    }

    fn record_context(&self, record_id: RecordId) -> StoreResult<Option<RecordContext>> {
        self.inner.record_context(record_id)
    }
}

fn memo_log(entries: &[(i64, &str)]) -> String {
    let items: Vec<serde_json::Value> = entries
        .iter()
        .map(|(ts, text)| serde_json::json!({"ts": ts, "text": text}))
        .collect();
    serde_json::Value::Array(items).to_string()
}

fn texts<'a>(entries: impl Iterator<Item = &'a memo_timeline_core::TimelineEntry>) -> Vec<String> {
    entries.map(|entry| entry.memo.text.clone()).collect()
}

#[test]
fn ties_are_broken_by_record_id_then_insertion_index() {
    let aggregation = aggregate(vec![
        (30_i64, memo_log(&[(5, "r30-0"), (9, "r30-1")])),
        (10_i64, memo_log(&[(5, "r10-0"), (5, "r10-1")])),
        (20_i64, memo_log(&[(5, "r20-0")])),
    ]);

    assert_eq!(
        texts(aggregation.entries.iter()),
        vec!["r30-1", "r10-0", "r10-1", "r20-0", "r30-0"]
    );
    let positions: Vec<usize> = aggregation.entries.iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![1, 0, 1, 0, 0]);
}

#[test]
fn one_malformed_record_among_ten_is_reported_and_excluded() {
    let mut records: Vec<(i64, String)> = (1..=10_i64)
        .map(|id| (id, memo_log(&[(id * 10, "x"), (id * 10 + 1, "y")])))
        .collect();
    records[4].1 = "{not an array".to_string();

    let aggregation = aggregate(records);

    assert_eq!(aggregation.entries.len(), 18);
    assert_eq!(aggregation.parse_errors.len(), 1);
    assert_eq!(aggregation.parse_errors[0].0, 5);
    assert_eq!(aggregation.parse_errors[0].1.raw, "{not an array");
    assert!(aggregation.entries.iter().all(|entry| entry.record_id != 5));
}

#[test]
fn scan_and_aggregate_merge_all_records() {
    let store = MemoryCollectionStore::new();
    store.insert_record(1, Some("Default"), [("Front", "<b>capital</b> of France"), ("_MemoLog", r#"[{"ts":100,"text":"a"}]"#)]);
    store.insert_record(2, None, [("Front", "q"), ("_MemoLog", r#"[{"ts":200,"text":"b"}]"#)]);
    store.insert_record(3, None, [("Front", "q"), ("_MemoLog", "   ")]);

    let options = ScanOptions::new("_MemoLog");
    let timeline = build_timeline(&store, &options, None, &CancellationToken::new(), &Utc).unwrap();

    assert_eq!(texts(timeline.entries()), vec!["b", "a"]);
    assert_eq!(timeline.scan_summary().total, 2);
    let context = timeline.entries().nth(1).unwrap().context.clone().unwrap();
    assert_eq!(context.deck_name.as_deref(), Some("Default"));
    assert_eq!(context.snippet.as_deref(), Some("capital of France"));
}

#[test]
fn cancelled_build_reports_cancellation() {
    let store = MemoryCollectionStore::new();
    store.insert_record(1, None, [("_MemoLog", r#"[{"ts":1,"text":"a"}]"#)]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = build_timeline(&store, &ScanOptions::new("_MemoLog"), None, &cancel, &Utc).unwrap_err();
    assert!(matches!(err, memo_timeline_core::TimelineError::Cancelled));
}

#[test]
fn record_removed_during_scan_is_skipped() {
    let inner = MemoryCollectionStore::new();
    inner.insert_record(1, None, [("_MemoLog", r#"[{"ts":100,"text":"a"}]"#)]);
    inner.insert_record(2, None, [("_MemoLog", r#"[{"ts":200,"text":"gone"}]"#)]);
    inner.insert_record(3, None, [("_MemoLog", r#"[{"ts":300,"text":"c"}]"#)]);
    let store = VanishingStore {
        inner,
        vanishing: 2,
    };

    let timeline = build_timeline(&store, &ScanOptions::new("_MemoLog"), None, &CancellationToken::new(), &Utc).unwrap();

    assert_eq!(store.inner.record_count(), 2);
    assert_eq!(timeline.scan_summary().total, 3);
    assert_eq!(timeline.scan_summary().skipped, 1);
    assert_eq!(texts(timeline.entries()), vec!["c", "a"]);
    assert!(timeline.parse_errors().is_empty());
}

#[test]
fn bad_elements_do_not_hide_sibling_memos() {
    let aggregation = aggregate(vec![
        (1_i64, r#"[{"ts":1,"text":"valid"},{"ts":2,"text":""}]"#.to_string()),
        (2_i64, r#"[{"ts":3,"text":"keep me","id":7},{"ts":4,"text":"and me"}]"#.to_string()),
    ]);

    assert!(aggregation.parse_errors.is_empty());
    assert_eq!(
        texts(aggregation.entries.iter()),
        vec!["and me", "keep me", "valid"]
    );
}
