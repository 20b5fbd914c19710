//! Redis-backed lease store.
//!
//! Scheduled/tasked are sorted sets scored by unix seconds, pending is a set,
//! the fetch window is a sorted set scored by fetch time, and the backlog
//! gauge is a plain counter key. Read-range + delete + insert moves run as a
//! single server-side Lua script so concurrent scheduler processes never
//! observe a half-applied move.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use super::{LeaseCounts, LeaseStore};
use crate::feed::FeedId;
use crate::Result;

const SCHEDULED_KEY: &str = "feeds:scheduled";
const PENDING_KEY: &str = "feeds:pending";
const TASKED_KEY: &str = "feeds:tasked";
const FETCH_WINDOW_KEY: &str = "feeds:fetched_last_hour";
const BACKLOG_KEY: &str = "feeds:backlog";

/// Moves every member of the sorted set KEYS[1] with score <= ARGV[1] into
/// the plain set KEYS[2], returning the moved members.
const MOVE_DUE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
if #ids > 0 then
    redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
    redis.call('SADD', KEYS[2], unpack(ids))
end
return ids
"#;

pub struct RedisLeaseStore {
    conn: MultiplexedConnection,
    move_due: Script,
}

impl RedisLeaseStore {
    /// Connect to the Redis server at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        tracing::info!("Connected to lease store at {}", url);

        Ok(Self {
            conn,
            move_due: Script::new(MOVE_DUE_SCRIPT),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    async fn take_due(&self, from: &str, cutoff: i64) -> Result<Vec<FeedId>> {
        let mut conn = self.conn();
        let ids: Vec<FeedId> = self
            .move_due
            .key(from)
            .key(PENDING_KEY)
            .arg(cutoff)
            .invoke_async(&mut conn)
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn schedule(&self, id: FeedId, due: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.zadd(SCHEDULED_KEY, id, due.timestamp()).await?;
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<FeedId>> {
        self.take_due(SCHEDULED_KEY, now.timestamp()).await
    }

    async fn reclaim_abandoned(&self, cutoff: DateTime<Utc>) -> Result<Vec<FeedId>> {
        self.take_due(TASKED_KEY, cutoff.timestamp()).await
    }

    async fn sample_pending(&self, max: usize) -> Result<Vec<FeedId>> {
        // Positive count: distinct members, set untouched
        let mut conn = self.conn();
        let ids: Vec<FeedId> = conn.srandmember_multiple(PENDING_KEY, max).await?;
        Ok(ids)
    }

    async fn claim(&self, ids: &[FeedId], at: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ts = at.timestamp();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for id in ids {
            pipe.srem(PENDING_KEY, id).ignore();
            pipe.zadd(TASKED_KEY, id, ts).ignore();
        }
        let mut conn = self.conn();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn complete(&self, id: FeedId) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.zrem(TASKED_KEY, id).await?;
        Ok(())
    }

    async fn requeue(&self, id: FeedId) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zrem(TASKED_KEY, id).ignore();
        pipe.sadd(PENDING_KEY, id).ignore();
        let mut conn = self.conn();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn record_fetch(&self, id: FeedId, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.zadd(FETCH_WINDOW_KEY, id, at.timestamp()).await?;
        Ok(())
    }

    async fn prune_fetch_window(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.conn();
        let removed: u64 = conn
            .zrembyscore(FETCH_WINDOW_KEY, "-inf", before.timestamp())
            .await?;
        Ok(removed)
    }

    async fn backlog_add(&self, delta: i64) -> Result<()> {
        let mut conn = self.conn();
        let value: i64 = conn.incr(BACKLOG_KEY, delta).await?;
        if value < 0 {
            // Completion raced a gauge reset; pin back to zero
            let _: () = conn.set(BACKLOG_KEY, 0).await?;
        }
        Ok(())
    }

    async fn backlog(&self) -> Result<i64> {
        let mut conn = self.conn();
        let value: Option<i64> = conn.get(BACKLOG_KEY).await?;
        Ok(value.unwrap_or(0).max(0))
    }

    async fn counts(&self) -> Result<LeaseCounts> {
        let mut conn = self.conn();
        let (scheduled, pending, tasked): (u64, u64, u64) = redis::pipe()
            .zcard(SCHEDULED_KEY)
            .scard(PENDING_KEY)
            .zcard(TASKED_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(LeaseCounts {
            scheduled,
            pending,
            tasked,
        })
    }
}
