//! Core domain logic for the memo timeline engine.
//! Memos live in one field per host record; this crate merges them into a
//! single cached, filterable timeline and applies per-record mutations.

pub mod codec;
pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod timeline;

pub use codec::{decode, encode, EncodeError, ParseError};
pub use config::{ConfigError, ConflictPolicy, EngineConfig};
pub use export::{export_to_path, render, ExportError, ExportFormat, NO_MEMOS_MARKER};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::memo::{DisplayConfig, MemoId, MemoRecord, MemoValidationError, RecordId, RecordMemoLog};
pub use model::timeline::{
    DateBucket, FilterError, FilterSpec, RecordContext, RecordRef, TimelineEntry,
};
pub use service::engine::MemoEngine;
pub use service::memo_service::{MemoService, MemoServiceError};
pub use service::timeline_service::{TimelineService, TimelineServiceError, TimelineView};
pub use store::{
    CollectionStore, MemoryCollectionStore, SqliteCollectionStore, StoreError, StoreResult,
    DEFAULT_MEMO_FIELD,
};
pub use timeline::aggregator::{aggregate, bucket_by_day, build_timeline, Timeline};
pub use timeline::cache::{CacheEpoch, CacheSnapshot, TimelineCache};
pub use timeline::filter::{apply_display_cap, filter_entries};
pub use timeline::scanner::{
    scan, CancellationToken, ProgressCallback, ScanOptions, ScanProgress, ScanSummary,
};
pub use timeline::TimelineError;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
