use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use memo_timeline_core::{
    aggregate, apply_display_cap, filter_entries, FilterError, FilterSpec, TimelineEntry,
    DisplayConfig,
};

fn tokyo() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<FixedOffset> {
    tokyo().with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn entries_at(timestamps: &[i64]) -> Vec<TimelineEntry> {
    let items: Vec<serde_json::Value> = timestamps
        .iter()
        .map(|ts| serde_json::json!({"ts": ts, "text": format!("memo-{ts}")}))
        .collect();
    aggregate(vec![(1_i64, serde_json::Value::Array(items).to_string())]).entries
}

fn selected(entries: &[TimelineEntry], spec: FilterSpec, now: &DateTime<FixedOffset>) -> Vec<i64> {
    filter_entries(entries, spec, now)
        .unwrap()
        .into_iter()
        .map(|entry| entry.memo.timestamp)
        .collect()
}

#[test]
fn today_includes_local_midnight_and_excludes_prior_day() {
    let now = at(2024, 3, 10, 15, 0, 0);
    let midnight = at(2024, 3, 10, 0, 0, 0).timestamp();
    let last_second_before = midnight - 1;
    let entries = entries_at(&[midnight, last_second_before, now.timestamp()]);

    assert_eq!(
        selected(&entries, FilterSpec::Today, &now),
        vec![now.timestamp(), midnight]
    );
}

#[test]
fn trailing_windows_cover_exact_calendar_days() {
    let now = at(2024, 3, 31, 23, 59, 59);
    let start_of_day = |days_back: i64| (at(2024, 3, 31, 0, 0, 0) - Duration::days(days_back)).timestamp();
    let entries = entries_at(&[
        start_of_day(6),
        start_of_day(6) - 1,
        start_of_day(29),
        start_of_day(29) - 1,
    ]);

    assert_eq!(
        selected(&entries, FilterSpec::Last7Days, &now),
        vec![start_of_day(6)]
    );
    assert_eq!(
        selected(&entries, FilterSpec::Last30Days, &now),
        vec![start_of_day(6), start_of_day(6) - 1, start_of_day(29)]
    );
}

#[test]
fn custom_range_is_inclusive_and_validated_first() {
    let now = at(2024, 3, 10, 12, 0, 0);
    let entries = entries_at(&[
        at(2024, 3, 1, 0, 0, 0).timestamp(),
        at(2024, 3, 2, 23, 59, 59).timestamp(),
        at(2024, 3, 3, 0, 0, 0).timestamp(),
    ]);
    let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();

    let spec = FilterSpec::custom(day(1), day(2)).unwrap();
    assert_eq!(selected(&entries, spec, &now).len(), 2);

    let reversed = FilterSpec::Custom { from: day(3), to: day(1) };
    let err = filter_entries(&entries, reversed, &now).unwrap_err();
    assert_eq!(err, FilterError::InvalidRange { from: day(3), to: day(1) });
}

#[test]
fn filtering_never_reorders() {
    let now = at(2024, 3, 10, 12, 0, 0);
    let base = at(2024, 3, 10, 1, 0, 0).timestamp();
    let entries = entries_at(&[base + 5, base + 1, base + 3, base + 1]);
    let all: Vec<i64> = entries.iter().map(|e| e.memo.timestamp).collect();

    assert_eq!(selected(&entries, FilterSpec::All, &now), all);
    assert_eq!(selected(&entries, FilterSpec::Today, &now), all);
}

#[test]
fn cap_keeps_the_most_recent_entries() {
    let now = at(2024, 3, 10, 12, 0, 0);
    let timestamps: Vec<i64> = (0..600).map(|i| now.timestamp() - i * 60).collect();
    let entries = entries_at(&timestamps);

    let mut matching = filter_entries(&entries, FilterSpec::All, &now).unwrap();
    let truncated = apply_display_cap(&mut matching, DisplayConfig::default().max_display_memos);

    assert!(truncated);
    assert_eq!(matching.len(), 500);
    assert_eq!(matching[0].memo.timestamp, now.timestamp());
    assert_eq!(matching[499].memo.timestamp, now.timestamp() - 499 * 60);
    assert_eq!(entries.len(), 600);
}
