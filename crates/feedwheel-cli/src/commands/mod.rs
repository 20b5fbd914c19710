pub mod add;
pub mod daemon;
pub mod list;
pub mod push;
pub mod status;
pub mod tick;
pub mod update;

use std::sync::Arc;

use anyhow::Result;

use feedwheel_core::catalog::Database;
use feedwheel_core::feed::HttpFeedUpdater;
use feedwheel_core::lease::{LeaseStore, MemoryLeaseStore, RedisLeaseStore};
use feedwheel_core::scheduler::SchedulerContext;
use feedwheel_core::AppConfig;

/// Wire up the database, lease store and updater for one-shot commands and
/// the daemon
pub async fn build_context(config: Arc<AppConfig>) -> Result<SchedulerContext> {
    let db = Database::new(&config).await?;
    let store: Arc<dyn LeaseStore> = match config.lease.backend.as_str() {
        "redis" => Arc::new(RedisLeaseStore::connect(&config.lease.redis_url).await?),
        "memory" => Arc::new(MemoryLeaseStore::new()),
        other => anyhow::bail!("Unknown lease backend '{}', expected 'memory' or 'redis'", other),
    };
    let updater = Arc::new(HttpFeedUpdater::new(&config, db.clone(), store.clone())?);

    Ok(SchedulerContext {
        db,
        store,
        updater,
        config,
    })
}
