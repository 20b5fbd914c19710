//! Bounded-concurrency execution of feed update batches.
//!
//! Every worker exit path settles the lease exactly once: success and
//! not-found clear the tasked entry, failure and timeout move the id back to
//! pending. A failing feed never aborts its siblings.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;

use super::SchedulerContext;
use crate::catalog::FeedRepository;
use crate::feed::{FeedId, UpdateOptions};
use crate::lease::LeaseStore;
use crate::{Error, Result};

/// Aggregate result of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub updated: u32,
    pub skipped: u32,
    pub missing: u32,
    pub failed: u32,
}

impl BatchOutcome {
    fn absorb(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Updated => self.updated += 1,
            Disposition::Skipped => self.skipped += 1,
            Disposition::Missing => self.missing += 1,
            Disposition::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Disposition {
    Updated,
    Skipped,
    Missing,
    Failed,
}

/// Run `ids` through the updater with bounded concurrency.
///
/// Ids are expected to be claimed (tasked) already; the backlog gauge is
/// decremented once per id on every path.
pub async fn run_update_batch(
    ctx: &SchedulerContext,
    ids: Vec<FeedId>,
    options: UpdateOptions,
) -> Result<BatchOutcome> {
    let concurrency = ctx.config.scheduler.concurrency.max(1);
    let timeout = Duration::from_secs(ctx.config.scheduler.update_timeout_secs);

    let mut outcome = BatchOutcome::default();
    let mut join_set: JoinSet<Disposition> = JoinSet::new();
    let mut iter = ids.into_iter();

    fn spawn_task(
        join_set: &mut JoinSet<Disposition>,
        ctx: SchedulerContext,
        id: FeedId,
        options: UpdateOptions,
        timeout: Duration,
    ) {
        join_set.spawn(async move {
            let disposition = run_one(&ctx, id, &options, timeout).await;
            if let Err(e) = ctx.store.backlog_add(-1).await {
                tracing::warn!(feed_id = id, "Failed to decrement backlog: {}", e);
            }
            disposition
        });
    }

    for _ in 0..concurrency {
        if let Some(id) = iter.next() {
            spawn_task(&mut join_set, ctx.clone(), id, options.clone(), timeout);
        }
    }

    while let Some(result) = join_set.join_next().await {
        let disposition = result
            .map_err(|e| Error::Other(format!("Update task join error: {}", e)))?;
        outcome.absorb(disposition);

        if let Some(id) = iter.next() {
            spawn_task(&mut join_set, ctx.clone(), id, options.clone(), timeout);
        }
    }

    Ok(outcome)
}

/// Execute one feed update and settle its lease
async fn run_one(
    ctx: &SchedulerContext,
    id: FeedId,
    options: &UpdateOptions,
    timeout: Duration,
) -> Disposition {
    let repo = FeedRepository::new(&ctx.db);

    let feed = match repo.find_by_id(id).await {
        Ok(Some(feed)) => feed,
        Ok(None) => {
            // Deleted between scheduling and dispatch; clear the lease so it
            // cannot requeue forever
            tracing::info!(feed_id = id, "Feed no longer exists, dropping");
            settle(ctx.store.as_ref(), id, false).await;
            return Disposition::Missing;
        }
        Err(e) => {
            tracing::error!(feed_id = id, "Catalog lookup failed: {}", e);
            settle(ctx.store.as_ref(), id, true).await;
            return Disposition::Failed;
        }
    };

    match tokio::time::timeout(timeout, ctx.updater.update(&feed, options)).await {
        Ok(Ok(result)) => {
            settle(ctx.store.as_ref(), id, false).await;
            if !result.skipped {
                if let Err(e) = ctx.store.record_fetch(id, Utc::now()).await {
                    tracing::warn!(feed_id = id, "Failed to record fetch: {}", e);
                }
                Disposition::Updated
            } else {
                Disposition::Skipped
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(feed_id = id, "Update failed, requeuing: {}", e);
            settle(ctx.store.as_ref(), id, true).await;
            Disposition::Failed
        }
        Err(_) => {
            tracing::warn!(
                feed_id = id,
                timeout_secs = timeout.as_secs(),
                "Update timed out, requeuing"
            );
            settle(ctx.store.as_ref(), id, true).await;
            Disposition::Failed
        }
    }
}

/// Clear or requeue the lease. A store failure here is logged, not
/// propagated: the reclamation sweep is the backstop.
async fn settle(store: &dyn LeaseStore, id: FeedId, requeue: bool) {
    let result = if requeue {
        store.requeue(id).await
    } else {
        store.complete(id).await
    };
    if let Err(e) = result {
        tracing::error!(feed_id = id, requeue, "Failed to settle lease: {}", e);
    }
}
