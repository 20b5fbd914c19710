//! Batch building: samples regular work from the pending set and pulls force
//! and stale candidates from the catalog as a correctness safety net.

use chrono::{DateTime, Duration, Utc};

use super::admission;
use crate::catalog::{Database, FeedRepository};
use crate::feed::FeedId;
use crate::lease::LeaseStore;
use crate::Result;

/// Maximum pending ids sampled per tick
pub const REGULAR_BATCH_MAX: usize = 1000;

/// Maximum never-fetched feeds forced per tick
pub const FORCE_BATCH_MAX: u32 = 100;

/// Maximum overdue feeds rescued per tick
pub const STALE_BATCH_MAX: u32 = 500;

/// A feed whose due time slipped this far is treated as lost from the schedule
pub const STALE_AFTER_DAYS: i64 = 3;

/// One tick's worth of dispatchable work
#[derive(Debug, Clone, Default)]
pub struct DispatchPlan {
    /// Sampled from the pending set; empty when intake is throttled
    pub regular: Vec<FeedId>,
    /// Never-fetched subscribed feeds; run with force=true
    pub force: Vec<FeedId>,
    /// Feeds whose schedule entry was lost or delayed
    pub stale: Vec<FeedId>,
}

impl DispatchPlan {
    pub fn total(&self) -> usize {
        self.regular.len() + self.force.len() + self.stale.len()
    }

    /// All ids in dispatch order
    pub fn all_ids(&self) -> Vec<FeedId> {
        let mut ids = Vec::with_capacity(self.total());
        ids.extend_from_slice(&self.regular);
        ids.extend_from_slice(&self.force);
        ids.extend_from_slice(&self.stale);
        ids
    }

    /// Drop duplicate ids across batches so a feed runs at most once per
    /// tick. Force wins over stale, stale over regular.
    fn dedup(mut self) -> Self {
        let force: std::collections::HashSet<FeedId> = self.force.iter().copied().collect();
        self.stale.retain(|id| !force.contains(id));
        let keep_out: std::collections::HashSet<FeedId> =
            force.into_iter().chain(self.stale.iter().copied()).collect();
        self.regular.retain(|id| !keep_out.contains(id));
        self
    }
}

/// Build the three batches for `now`. Sampling leaves the pending set
/// untouched; claiming happens at dispatch time.
pub async fn build_batches(
    db: &Database,
    store: &dyn LeaseStore,
    now: DateTime<Utc>,
) -> Result<DispatchPlan> {
    let regular = if admission::should_throttle(store).await? {
        tracing::debug!("Intake throttled, skipping regular batch");
        Vec::new()
    } else {
        store.sample_pending(REGULAR_BATCH_MAX).await?
    };

    let repo = FeedRepository::new(db);
    let force = repo.never_fetched(FORCE_BATCH_MAX).await?;
    let stale = repo
        .stale_scheduled(now - Duration::days(STALE_AFTER_DAYS), STALE_BATCH_MAX)
        .await?;

    Ok(DispatchPlan {
        regular,
        force,
        stale,
    }
    .dedup())
}
