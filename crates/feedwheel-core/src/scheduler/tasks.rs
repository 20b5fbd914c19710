//! Job entry points submittable to the scheduling system.

use bytes::Bytes;
use chrono::Utc;

use super::{tick, worker, SchedulerContext};
use crate::catalog::{FeedRepository, OpsRepository};
use crate::feed::{FeedId, UpdateOutcome};
use crate::{Error, Result};

/// Run one scheduler tick: promote, reclaim, dispatch, execute
pub async fn schedule_tick(ctx: &SchedulerContext) -> Result<tick::TickSummary> {
    tick::run_tick(ctx).await
}

/// Update a batch of feeds with options derived from the current
/// operational snapshot
pub async fn update_feeds(
    ctx: &SchedulerContext,
    feed_ids: &[FeedId],
) -> Result<worker::BatchOutcome> {
    run_batch(ctx, feed_ids, false).await
}

/// Update newly added feeds, bypassing the already-fresh skip logic
pub async fn new_feeds(
    ctx: &SchedulerContext,
    feed_ids: &[FeedId],
) -> Result<worker::BatchOutcome> {
    run_batch(ctx, feed_ids, true).await
}

async fn run_batch(
    ctx: &SchedulerContext,
    feed_ids: &[FeedId],
    force: bool,
) -> Result<worker::BatchOutcome> {
    if feed_ids.is_empty() {
        return Ok(worker::BatchOutcome::default());
    }

    let snapshot = OpsRepository::new(&ctx.db).load_snapshot().await?;
    let options = snapshot.scheduled_options(force);

    ctx.store.claim(feed_ids, Utc::now()).await?;
    ctx.store.backlog_add(feed_ids.len() as i64).await?;

    worker::run_update_batch(ctx, feed_ids.to_vec(), options).await
}

/// Apply externally supplied content to a single feed, synchronously.
///
/// Bypasses pending/tasked bookkeeping entirely; the content is already
/// fetched, so only the catalog is touched.
pub async fn push_update(
    ctx: &SchedulerContext,
    feed_id: FeedId,
    content: Bytes,
) -> Result<UpdateOutcome> {
    let snapshot = OpsRepository::new(&ctx.db).load_snapshot().await?;
    let options = snapshot.push_options();

    let repo = FeedRepository::new(&ctx.db);
    let feed = repo
        .find_by_id(feed_id)
        .await?
        .ok_or(Error::FeedNotFound(feed_id))?;

    ctx.updater.apply(&feed, content, &options).await
}

/// Schedule an immediate fetch for the given feeds
pub async fn schedule_immediate(ctx: &SchedulerContext, feed_ids: &[FeedId]) -> Result<()> {
    let now = Utc::now();
    let repo = FeedRepository::new(&ctx.db);

    for id in feed_ids {
        repo.set_next_scheduled_update(*id, now).await?;
        ctx.store.schedule(*id, now).await?;
    }

    tracing::info!(feeds = feed_ids.len(), "Scheduled immediate fetches");
    Ok(())
}

/// Set up feeds for newly subscribed premium users: activate, ensure a
/// counted subscriber, and schedule an immediate fetch
pub async fn premium_setup(ctx: &SchedulerContext, feed_ids: &[FeedId]) -> Result<u64> {
    let repo = FeedRepository::new(&ctx.db);
    let updated = repo.setup_for_subscribers(feed_ids).await?;
    schedule_immediate(ctx, feed_ids).await?;

    tracing::info!(feeds = feed_ids.len(), updated, "Premium feed setup complete");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::REPLICATION_LAG;
    use crate::scheduler::test_support::{context_with, seed_feed_with_id, MockUpdater};

    #[tokio::test]
    async fn update_feeds_claims_and_settles() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;

        seed_feed_with_id(&ctx.db, 1).await;
        seed_feed_with_id(&ctx.db, 2).await;

        let outcome = update_feeds(&ctx, &[1, 2]).await.unwrap();
        assert_eq!(outcome.updated, 2);

        let counts = ctx.store.counts().await.unwrap();
        assert_eq!(counts.tasked, 0);
        assert_eq!(ctx.store.backlog().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn new_feeds_run_with_force() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;

        seed_feed_with_id(&ctx.db, 1).await;
        new_feeds(&ctx, &[1]).await.unwrap();

        let calls = updater.calls.lock().unwrap();
        assert!(calls[0].1.force);
    }

    #[tokio::test]
    async fn push_update_skips_lease_bookkeeping() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;

        seed_feed_with_id(&ctx.db, 9).await;
        let outcome = push_update(&ctx, 9, Bytes::from_static(b"<rss/>"))
            .await
            .unwrap();
        assert!(!outcome.skipped);

        let counts = ctx.store.counts().await.unwrap();
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.tasked, 0);
    }

    #[tokio::test]
    async fn push_update_uses_looser_lag_threshold() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;

        seed_feed_with_id(&ctx.db, 9).await;
        OpsRepository::new(&ctx.db)
            .set(REPLICATION_LAG, "30")
            .await
            .unwrap();

        push_update(&ctx, 9, Bytes::from_static(b"<rss/>")).await.unwrap();
        update_feeds(&ctx, &[9]).await.unwrap();

        let calls = updater.calls.lock().unwrap();
        // Push at 30s lag still scores; scheduled at 30s lag does not
        assert!(calls[0].1.compute_scores);
        assert!(!calls[1].1.compute_scores);
    }

    #[tokio::test]
    async fn push_update_for_unknown_feed_errors() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater).await;

        let err = push_update(&ctx, 404, Bytes::from_static(b"<rss/>"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FeedNotFound(404)));
    }

    #[tokio::test]
    async fn schedule_immediate_lands_in_scheduled_set() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater).await;

        seed_feed_with_id(&ctx.db, 5).await;
        schedule_immediate(&ctx, &[5]).await.unwrap();

        assert_eq!(ctx.store.counts().await.unwrap().scheduled, 1);
        let promoted = ctx.store.promote_due(Utc::now()).await.unwrap();
        assert_eq!(promoted, vec![5]);
    }

    #[tokio::test]
    async fn premium_setup_activates_and_schedules() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater).await;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO feeds (id, url, active, fetched_once, active_subscriber_count,
                               created_at, updated_at)
            VALUES (6, 'https://example.com/dormant', 0, 1, 0, ?, ?)
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(ctx.db.pool())
        .await
        .unwrap();

        let updated = premium_setup(&ctx, &[6]).await.unwrap();
        assert_eq!(updated, 1);

        let repo = FeedRepository::new(&ctx.db);
        let feed = repo.find_by_id(6).await.unwrap().unwrap();
        assert!(feed.active);
        assert_eq!(feed.active_subscriber_count, 1);
        assert_eq!(ctx.store.counts().await.unwrap().scheduled, 1);
    }
}
