//! Lease store: shared scheduling state for horizontally scaled schedulers.
//!
//! Holds four logical structures:
//!
//! - **scheduled**: ordered map feed-id -> due timestamp
//! - **pending**: deduplicated set of feed ids awaiting dispatch
//! - **tasked**: ordered map feed-id -> task-start timestamp (the lease)
//! - **fetch window**: (feed-id, fetched-at) pairs for the last-hour rate metric
//!
//! plus the backlog gauge read by admission control. A feed id is in at most
//! one of {pending, tasked} at any instant; transitions are atomic moves.

mod memory;
mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::feed::FeedId;
use crate::Result;

pub use self::memory::MemoryLeaseStore;
pub use self::redis::RedisLeaseStore;

/// Cardinalities of the lease structures, for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseCounts {
    pub scheduled: u64,
    pub pending: u64,
    pub tasked: u64,
}

/// Trait for lease store backends.
///
/// Implementations must make every move-type operation (promote, reclaim,
/// claim, requeue) atomic: a reader never observes the id removed from one
/// structure but not yet inserted into the other.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Insert or update a feed's due time in the scheduled set
    async fn schedule(&self, id: FeedId, due: DateTime<Utc>) -> Result<()>;

    /// Atomically move every scheduled entry with due <= `now` into the
    /// pending set and return the moved ids
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<FeedId>>;

    /// Atomically move every tasked entry started before `cutoff` back into
    /// the pending set and return the reclaimed ids
    async fn reclaim_abandoned(&self, cutoff: DateTime<Utc>) -> Result<Vec<FeedId>>;

    /// Uniform sample of up to `max` distinct pending ids, without removal
    async fn sample_pending(&self, max: usize) -> Result<Vec<FeedId>>;

    /// Atomically remove `ids` from pending (no-op for absent ids) and insert
    /// them into tasked with start time `at`
    async fn claim(&self, ids: &[FeedId], at: DateTime<Utc>) -> Result<()>;

    /// Clear a finished feed's tasked entry
    async fn complete(&self, id: FeedId) -> Result<()>;

    /// Atomically move a failed feed from tasked back to pending
    async fn requeue(&self, id: FeedId) -> Result<()>;

    /// Record a successful fetch in the rate window
    async fn record_fetch(&self, id: FeedId, at: DateTime<Utc>) -> Result<()>;

    /// Drop fetch-window entries older than `before`; returns how many
    async fn prune_fetch_window(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Adjust the backlog gauge (positive on dispatch, negative on completion)
    async fn backlog_add(&self, delta: i64) -> Result<()>;

    /// Read the backlog gauge (never negative)
    async fn backlog(&self) -> Result<i64>;

    /// Current cardinalities of the lease structures
    async fn counts(&self) -> Result<LeaseCounts>;
}
