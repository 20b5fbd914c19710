//! One scheduler tick: housekeeping, promotion, reclamation, dispatch.

use std::time::Instant;

use chrono::{Duration, Utc};

use super::{dispatch, worker, SchedulerContext};
use crate::catalog::OpsRepository;
use crate::Result;

/// Tasked entries older than this are treated as abandoned
pub const ABANDONED_AFTER_HOURS: i64 = 6;

/// Retention of the fetched-recently rate window
pub const FETCH_WINDOW_HOURS: i64 = 1;

/// Counters emitted after each tick
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSummary {
    pub promoted: usize,
    pub reclaimed: usize,
    pub regular: usize,
    pub force: usize,
    pub stale: usize,
    pub outcome: worker::BatchOutcome,
}

/// Run a full scheduler tick.
///
/// A lease store failure aborts the tick cleanly; nothing is half-moved
/// (moves are atomic in the store) and the next tick retries.
pub async fn run_tick(ctx: &SchedulerContext) -> Result<TickSummary> {
    let now = Utc::now();
    let start = Instant::now();

    // Housekeeping: expire the hourly fetch counter
    ctx.store
        .prune_fetch_window(now - Duration::hours(FETCH_WINDOW_HOURS))
        .await?;

    // Promote due feeds into pending
    let promoted = ctx.store.promote_due(now).await?;
    let promote_elapsed = start.elapsed();

    // Reclaim abandoned tasked feeds
    let reclaimed = ctx
        .store
        .reclaim_abandoned(now - Duration::hours(ABANDONED_AFTER_HOURS))
        .await?;
    if !reclaimed.is_empty() {
        tracing::info!(
            reclaimed = reclaimed.len(),
            "Re-queued abandoned tasked feeds"
        );
    }
    let reclaim_elapsed = start.elapsed();

    // Build this tick's batches
    let plan = dispatch::build_batches(&ctx.db, ctx.store.as_ref(), now).await?;
    let plan_elapsed = start.elapsed();

    // Claim everything we are about to run and surface it on the backlog gauge
    let all_ids = plan.all_ids();
    ctx.store.claim(&all_ids, now).await?;
    ctx.store.backlog_add(all_ids.len() as i64).await?;

    let snapshot = OpsRepository::new(&ctx.db).load_snapshot().await?;

    let mut outcome = worker::run_update_batch(
        ctx,
        plan.regular.clone(),
        snapshot.scheduled_options(false),
    )
    .await?;
    let force_outcome =
        worker::run_update_batch(ctx, plan.force.clone(), snapshot.scheduled_options(true))
            .await?;
    let stale_outcome =
        worker::run_update_batch(ctx, plan.stale.clone(), snapshot.scheduled_options(false))
            .await?;

    outcome.updated += force_outcome.updated + stale_outcome.updated;
    outcome.skipped += force_outcome.skipped + stale_outcome.skipped;
    outcome.missing += force_outcome.missing + stale_outcome.missing;
    outcome.failed += force_outcome.failed + stale_outcome.failed;

    let counts = ctx.store.counts().await?;
    tracing::info!(
        promoted = promoted.len(),
        reclaimed = reclaimed.len(),
        regular = plan.regular.len(),
        force = plan.force.len(),
        stale = plan.stale.len(),
        updated = outcome.updated,
        failed = outcome.failed,
        pending = counts.pending,
        scheduled = counts.scheduled,
        promote_ms = promote_elapsed.as_millis() as u64,
        reclaim_ms = (reclaim_elapsed - promote_elapsed).as_millis() as u64,
        plan_ms = (plan_elapsed - reclaim_elapsed).as_millis() as u64,
        run_ms = (start.elapsed() - plan_elapsed).as_millis() as u64,
        "Scheduler tick complete"
    );

    Ok(TickSummary {
        promoted: promoted.len(),
        reclaimed: reclaimed.len(),
        regular: plan.regular.len(),
        force: plan.force.len(),
        stale: plan.stale.len(),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::scheduler::test_support::{context_with, seed_feed_with_id, MockUpdater};

    #[tokio::test]
    async fn due_feed_is_promoted_claimed_and_updated() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;
        let now = Utc::now();

        seed_feed_with_id(&ctx.db, 7).await;
        ctx.store
            .schedule(7, now - Duration::seconds(10))
            .await
            .unwrap();

        let summary = run_tick(&ctx).await.unwrap();

        assert_eq!(summary.promoted, 1);
        assert_eq!(summary.regular, 1);
        assert_eq!(summary.outcome.updated, 1);
        assert_eq!(updater.call_ids(), vec![7]);

        // Fully drained: nothing scheduled, pending or tasked
        let counts = ctx.store.counts().await.unwrap();
        assert_eq!(counts.scheduled, 0);
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.tasked, 0);
    }

    #[tokio::test]
    async fn throttled_tick_promotes_but_does_not_dispatch() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;
        let now = Utc::now();

        seed_feed_with_id(&ctx.db, 7).await;
        ctx.store
            .schedule(7, now - Duration::seconds(10))
            .await
            .unwrap();
        // 84 * 12 = 1008 >= 1000
        ctx.store.backlog_add(84).await.unwrap();

        let summary = run_tick(&ctx).await.unwrap();

        assert_eq!(summary.promoted, 1);
        assert_eq!(summary.regular, 0);
        assert!(updater.call_ids().is_empty());

        // The due feed moved to pending and stayed there
        let counts = ctx.store.counts().await.unwrap();
        assert_eq!(counts.scheduled, 0);
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test]
    async fn abandoned_tasked_feed_is_reclaimed_and_rerun() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;
        let now = Utc::now();

        seed_feed_with_id(&ctx.db, 3).await;
        ctx.store.claim(&[3], now - Duration::hours(7)).await.unwrap();

        let summary = run_tick(&ctx).await.unwrap();

        assert_eq!(summary.reclaimed, 1);
        assert_eq!(updater.call_ids(), vec![3]);
        assert_eq!(ctx.store.counts().await.unwrap().tasked, 0);
    }

    #[tokio::test]
    async fn recent_tasked_feed_is_left_alone() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;
        let now = Utc::now();

        seed_feed_with_id(&ctx.db, 4).await;
        ctx.store.claim(&[4], now - Duration::hours(1)).await.unwrap();

        let summary = run_tick(&ctx).await.unwrap();

        assert_eq!(summary.reclaimed, 0);
        assert!(updater.call_ids().is_empty());
        assert_eq!(ctx.store.counts().await.unwrap().tasked, 1);
    }

    #[tokio::test]
    async fn failed_update_lands_back_in_pending() {
        let updater = Arc::new(MockUpdater::failing(&[42]));
        let ctx = context_with(updater.clone()).await;
        let now = Utc::now();

        for id in [41, 42] {
            seed_feed_with_id(&ctx.db, id).await;
            ctx.store
                .schedule(id, now - Duration::seconds(10))
                .await
                .unwrap();
        }

        let summary = run_tick(&ctx).await.unwrap();

        assert_eq!(summary.outcome.updated, 1);
        assert_eq!(summary.outcome.failed, 1);
        assert_eq!(ctx.store.sample_pending(10).await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn never_fetched_feed_is_forced() {
        let updater = Arc::new(MockUpdater::default());
        let ctx = context_with(updater.clone()).await;
        let now = Utc::now();

        // Seeded helper marks feeds fetched; insert a raw unfetched one
        sqlx::query(
            r#"
            INSERT INTO feeds (id, url, active, fetched_once, active_subscriber_count,
                               created_at, updated_at)
            VALUES (5, 'https://example.com/new', 1, 0, 1, ?, ?)
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(ctx.db.pool())
        .await
        .unwrap();

        let summary = run_tick(&ctx).await.unwrap();

        assert_eq!(summary.force, 1);
        let calls = updater.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 5);
        assert!(calls[0].1.force);
    }
}
