mod admission;
mod dispatch;
mod service;
pub mod tasks;
mod tick;
mod worker;

use std::sync::Arc;

use crate::catalog::Database;
use crate::config::AppConfig;
use crate::feed::FeedUpdater;
use crate::lease::LeaseStore;

pub use admission::{is_throttled, should_throttle, BACKLOG_MULTIPLIER, BACKLOG_THRESHOLD};
pub use dispatch::{
    build_batches, DispatchPlan, FORCE_BATCH_MAX, REGULAR_BATCH_MAX, STALE_AFTER_DAYS,
    STALE_BATCH_MAX,
};
pub use service::SchedulerService;
pub use tick::{run_tick, TickSummary, ABANDONED_AFTER_HOURS, FETCH_WINDOW_HOURS};
pub use worker::{run_update_batch, BatchOutcome};

/// Shared handles for everything the scheduling core touches
#[derive(Clone)]
pub struct SchedulerContext {
    pub db: Database,
    pub store: Arc<dyn LeaseStore>,
    pub updater: Arc<dyn FeedUpdater>,
    pub config: Arc<AppConfig>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{DateTime, Utc};

    use super::SchedulerContext;
    use crate::catalog::Database;
    use crate::config::AppConfig;
    use crate::feed::{Feed, FeedId, FeedUpdater, UpdateOptions, UpdateOutcome};
    use crate::lease::MemoryLeaseStore;
    use crate::{Error, Result};

    /// Scriptable updater double: records calls, fails for listed ids
    #[derive(Default)]
    pub struct MockUpdater {
        pub fail_ids: HashSet<FeedId>,
        pub calls: Mutex<Vec<(FeedId, UpdateOptions)>>,
    }

    impl MockUpdater {
        pub fn failing(ids: &[FeedId]) -> Self {
            Self {
                fail_ids: ids.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_ids(&self) -> Vec<FeedId> {
            self.calls.lock().unwrap().iter().map(|(id, _)| *id).collect()
        }

        fn record(&self, feed: &Feed, options: &UpdateOptions) -> Result<UpdateOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((feed.id, options.clone()));
            if self.fail_ids.contains(&feed.id) {
                return Err(Error::Other("simulated update failure".to_string()));
            }
            Ok(UpdateOutcome {
                entries: 1,
                skipped: false,
            })
        }
    }

    #[async_trait]
    impl FeedUpdater for MockUpdater {
        async fn update(&self, feed: &Feed, options: &UpdateOptions) -> Result<UpdateOutcome> {
            self.record(feed, options)
        }

        async fn apply(
            &self,
            feed: &Feed,
            _content: Bytes,
            options: &UpdateOptions,
        ) -> Result<UpdateOutcome> {
            self.record(feed, options)
        }
    }

    /// Insert a catalog feed with an explicit id
    pub async fn seed_feed_with_id(db: &Database, id: FeedId) {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO feeds (id, url, active, fetched_once, active_subscriber_count,
                               created_at, updated_at)
            VALUES (?, ?, 1, 1, 1, ?, ?)
            "#,
        )
        .bind(id)
        .bind(format!("https://example.com/feed/{id}"))
        .bind(now)
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
    }

    /// Overwrite a seeded feed's next due time
    pub async fn set_feed_due(db: &Database, id: FeedId, due: DateTime<Utc>) {
        sqlx::query("UPDATE feeds SET next_scheduled_update = ? WHERE id = ?")
            .bind(due)
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    /// Build a context around an in-memory database, memory lease store and
    /// the given updater
    pub async fn context_with(updater: Arc<MockUpdater>) -> SchedulerContext {
        SchedulerContext {
            db: Database::new_in_memory().await.unwrap(),
            store: Arc::new(MemoryLeaseStore::new()),
            updater,
            config: Arc::new(AppConfig::default()),
        }
    }
}
