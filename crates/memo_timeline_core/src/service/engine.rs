//! Engine facade wiring mutations and timeline reads to one store.
//!
//! # Invariants
//! - Mutation service and timeline cache share one epoch, so every committed
//!   write marks the cached timeline stale.

use crate::config::{ConfigError, EngineConfig};
use crate::service::memo_service::MemoService;
use crate::service::timeline_service::TimelineService;
use crate::store::CollectionStore;
use crate::timeline::cache::TimelineCache;
use chrono::{Local, TimeZone};
use log::info;
use std::sync::Arc;

/// One memo timeline engine over a host collection.
pub struct MemoEngine<S: CollectionStore, Tz = Local> {
    memos: MemoService<Arc<S>>,
    timeline: TimelineService<S, Tz>,
    config: EngineConfig,
}

impl<S> MemoEngine<S, Local>
where
    S: CollectionStore + Send + Sync + 'static,
{
    /// Creates an engine bucketing days in the system time zone.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_time_zone(store, config, Local)
    }
}

impl<S, Tz> MemoEngine<S, Tz>
where
    S: CollectionStore + Send + Sync + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Creates an engine bucketing days in `tz`.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` when `config` fails validation.
    pub fn with_time_zone(store: Arc<S>, config: EngineConfig, tz: Tz) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = TimelineCache::new(Arc::clone(&store), config.scan_options(), tz.clone());
        let memos = MemoService::new(store, config.memo_field.clone(), cache.epoch())
            .with_conflict_policy(config.conflict_policy);
        let timeline = TimelineService::new(cache, config.display(), tz);
        info!(
            "event=engine_init module=service status=ok memo_field={} max_display_memos={} conflict_policy={:?}",
            config.memo_field, config.max_display_memos, config.conflict_policy
        );
        Ok(Self {
            memos,
            timeline,
            config,
        })
    }

    pub fn memos(&self) -> &MemoService<Arc<S>> {
        &self.memos
    }

    pub fn timeline(&self) -> &TimelineService<S, Tz> {
        &self.timeline
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::MemoEngine;
    use crate::config::EngineConfig;
    use crate::model::timeline::FilterSpec;
    use crate::store::MemoryCollectionStore;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    #[test]
    fn add_invalidates_and_forced_view_sees_it() {
        let store = Arc::new(MemoryCollectionStore::new());
        store.insert_record(1, None, [("_MemoLog", r#"[{"ts":100,"text":"a"}]"#)]);
        store.insert_record(2, None, [("_MemoLog", r#"[{"ts":200,"text":"b"}]"#)]);
        let engine = MemoEngine::with_time_zone(store, EngineConfig::default(), Utc).unwrap();
        let now = Utc.timestamp_opt(1_000, 0).unwrap();

        let texts = |force| -> Vec<String> {
            engine
                .timeline()
                .view(FilterSpec::All, &now, force)
                .unwrap()
                .buckets
                .iter()
                .flat_map(|bucket| bucket.entries.iter().map(|e| e.memo.text.clone()))
                .collect()
        };
        assert_eq!(texts(false), vec!["b", "a"]);

        engine.memos().add(1, "c", Some(300)).unwrap();
        assert!(engine.timeline().cache().peek().unwrap().stale);
        assert_eq!(texts(true), vec!["c", "b", "a"]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            scan_batch_size: 0,
            ..EngineConfig::default()
        };
        let store = Arc::new(MemoryCollectionStore::new());
        assert!(MemoEngine::with_time_zone(store, config, Utc).is_err());
    }
}
