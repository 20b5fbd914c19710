use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable integer identifier of a feed in the catalog
pub type FeedId = i64;

/// Represents a schedulable RSS/Atom feed source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: FeedId,
    pub url: String,
    pub title: Option<String>,
    pub active: bool,
    pub fetched_once: bool,
    pub active_subscriber_count: i64,
    pub next_scheduled_update: Option<DateTime<Utc>>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub fetch_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to register a new feed
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub url: String,
    pub title: Option<String>,
}

impl Feed {
    /// Check if the feed has a fetch error
    pub fn has_error(&self) -> bool {
        self.fetch_error.is_some()
    }
}

/// Replication lag above which scheduled updates skip score recomputation
pub const SCHEDULED_LAG_MAX_SECS: i64 = 10;

/// Replication lag above which push-triggered updates skip score recomputation
pub const PUSH_LAG_MAX_SECS: i64 = 60;

/// Per-job options handed to the feed updater
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Skip the real network fetch (operational testing flag)
    pub fake: bool,
    /// Fast-path timeout hint in seconds; 0 disables the fast path
    pub quick: f64,
    /// Recompute relevance scores on this run
    pub compute_scores: bool,
    /// Observed replication lag, passed through for the update logic
    pub replication_lag_secs: i64,
    /// Bypass the already-fresh skip logic
    pub force: bool,
}

/// Operational flags read once per tick/job, not live globals
#[derive(Debug, Clone, Default)]
pub struct OpsSnapshot {
    pub replication_lag_secs: i64,
    pub fake_fetch: bool,
    pub quick_fetch: f64,
}

impl OpsSnapshot {
    /// Options for a scheduled (or reclaimed) update batch
    pub fn scheduled_options(&self, force: bool) -> UpdateOptions {
        UpdateOptions {
            fake: self.fake_fetch,
            quick: self.quick_fetch,
            compute_scores: self.replication_lag_secs < SCHEDULED_LAG_MAX_SECS,
            replication_lag_secs: self.replication_lag_secs,
            force,
        }
    }

    /// Options for a push-triggered update; content arrives pre-fetched,
    /// so the lag threshold is looser
    pub fn push_options(&self) -> UpdateOptions {
        UpdateOptions {
            fake: false,
            quick: 0.0,
            compute_scores: self.replication_lag_secs < PUSH_LAG_MAX_SECS,
            replication_lag_secs: self.replication_lag_secs,
            force: false,
        }
    }
}
