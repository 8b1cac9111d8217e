use chrono::{FixedOffset, TimeZone};
use memo_timeline_core::{
    EngineConfig, ExportFormat, FilterSpec, MemoEngine, MemoId, MemoryCollectionStore,
    SqliteCollectionStore, DEFAULT_MEMO_FIELD, NO_MEMOS_MARKER,
};
use std::sync::Arc;

fn timeline_texts<S, Tz>(engine: &MemoEngine<S, Tz>, now: &chrono::DateTime<Tz>) -> Vec<String>
where
    S: memo_timeline_core::CollectionStore + Send + Sync + 'static,
    Tz: chrono::TimeZone + Send + Sync + 'static,
{
    engine
        .timeline()
        .view(FilterSpec::All, now, true)
        .unwrap()
        .buckets
        .iter()
        .flat_map(|bucket| bucket.entries.iter().map(|entry| entry.memo.text.clone()))
        .collect()
}

#[test]
fn end_to_end_add_appears_at_top_after_invalidation() {
    let store = Arc::new(MemoryCollectionStore::new());
    store.insert_record(1, None, [(DEFAULT_MEMO_FIELD, r#"[{"ts":100,"text":"a"}]"#)]);
    store.insert_record(2, None, [(DEFAULT_MEMO_FIELD, r#"[{"ts":200,"text":"b"}]"#)]);
    let tz = FixedOffset::east_opt(0).unwrap();
    let engine = MemoEngine::with_time_zone(Arc::clone(&store), EngineConfig::default(), tz).unwrap();
    let now = tz.timestamp_opt(10_000, 0).unwrap();

    assert_eq!(timeline_texts(&engine, &now), vec!["b", "a"]);

    engine.memos().add(1, "c", Some(300)).unwrap();
    assert_eq!(timeline_texts(&engine, &now), vec!["c", "b", "a"]);
}

#[test]
fn views_report_parse_errors_and_cap() {
    let store = Arc::new(MemoryCollectionStore::new());
    store.insert_record(1, None, [(DEFAULT_MEMO_FIELD, r#"[{"ts":1,"text":"a"},{"ts":2,"text":"b"},{"ts":3,"text":"c"}]"#)]);
    store.insert_record(2, None, [(DEFAULT_MEMO_FIELD, "oops")]);
    let config = EngineConfig::from_json_str(r#"{"max_display_memos": 2}"#).unwrap();
    let tz = FixedOffset::east_opt(0).unwrap();
    let engine = MemoEngine::with_time_zone(store, config, tz).unwrap();

    let view = engine
        .timeline()
        .view(FilterSpec::All, &tz.timestamp_opt(100, 0).unwrap(), false)
        .unwrap();

    assert_eq!(view.parse_error_count, 1);
    assert_eq!(view.total_matching, 3);
    assert!(view.truncated);
    assert_eq!(view.entry_count(), 2);
    assert!(!view.stale);
}

#[test]
fn export_writes_filtered_view_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteCollectionStore::open(dir.path().join("c.sqlite3")).unwrap());
    let record_id = store
        .create_record(Some("Default"), &[("Front", "q"), (DEFAULT_MEMO_FIELD, "")])
        .unwrap();
    let tz = FixedOffset::east_opt(9 * 3600).unwrap();
    let engine = MemoEngine::with_time_zone(store, EngineConfig::default(), tz).unwrap();
    let now = tz.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
    let yesterday = tz.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap().timestamp();
    engine.memos().add(record_id, "today <memo>", Some(now.timestamp())).unwrap();
    engine.memos().add(record_id, "yesterday", Some(yesterday)).unwrap();
    engine.timeline().view(FilterSpec::All, &now, true).unwrap();

    let markup_path = dir.path().join("today.html");
    engine
        .timeline()
        .export_to_path(FilterSpec::Today, &now, ExportFormat::Markup, &markup_path)
        .unwrap();
    let markup = std::fs::read_to_string(&markup_path).unwrap();
    assert!(markup.contains("<div class='memo-date'>2024-05-02</div>"));
    assert!(markup.contains(&format!("data-record-id='{record_id}'")));
    assert!(markup.contains("today &lt;memo&gt;"));
    assert!(!markup.contains("yesterday"));

    let text = engine
        .timeline()
        .render(FilterSpec::All, &now, ExportFormat::Text)
        .unwrap();
    assert_eq!(
        text,
        "2024-05-02\n  - today <memo>\n\n2024-05-01\n  - yesterday"
    );
}

#[test]
fn empty_selection_renders_marker() {
    let store = Arc::new(MemoryCollectionStore::new());
    let tz = FixedOffset::east_opt(0).unwrap();
    let engine = MemoEngine::with_time_zone(store, EngineConfig::default(), tz).unwrap();
    let text = engine
        .timeline()
        .render(FilterSpec::Today, &tz.timestamp_opt(0, 0).unwrap(), ExportFormat::Text)
        .unwrap();
    assert_eq!(text, NO_MEMOS_MARKER);
}

#[test]
fn retime_moves_memo_between_days() {
    let store = Arc::new(MemoryCollectionStore::new());
    store.insert_record(7, None, [(DEFAULT_MEMO_FIELD, r#"[{"id":"m","ts":0,"text":"moved"}]"#)]);
    let tz = FixedOffset::east_opt(0).unwrap();
    let engine = MemoEngine::with_time_zone(store, EngineConfig::default(), tz).unwrap();
    let now = tz.timestamp_opt(2 * 86_400, 0).unwrap();

    assert_eq!(engine.timeline().view(FilterSpec::Today, &now, false).unwrap().entry_count(), 0);
    engine.memos().retime(7, &MemoId::from("m"), now.timestamp()).unwrap();
    assert_eq!(engine.timeline().view(FilterSpec::Today, &now, true).unwrap().entry_count(), 1);
}
