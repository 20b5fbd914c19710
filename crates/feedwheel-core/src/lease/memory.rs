//! In-process lease store for tests and single-process deployments.
//!
//! One mutex guards all structures, so every move is trivially atomic.
//! Not suitable for multiple scheduler processes.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{LeaseCounts, LeaseStore};
use crate::feed::FeedId;
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    scheduled: BTreeMap<FeedId, i64>,
    pending: HashSet<FeedId>,
    tasked: BTreeMap<FeedId, i64>,
    fetch_window: Vec<(i64, FeedId)>,
    backlog: i64,
}

#[derive(Default)]
pub struct MemoryLeaseStore {
    inner: Mutex<Inner>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| Error::Store(format!("lease store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn schedule(&self, id: FeedId, due: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.scheduled.insert(id, due.timestamp());
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<FeedId>> {
        let cutoff = now.timestamp();
        let mut inner = self.lock()?;
        let due: Vec<FeedId> = inner
            .scheduled
            .iter()
            .filter(|(_, ts)| **ts <= cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            inner.scheduled.remove(id);
            inner.pending.insert(*id);
        }
        Ok(due)
    }

    async fn reclaim_abandoned(&self, cutoff: DateTime<Utc>) -> Result<Vec<FeedId>> {
        let cutoff = cutoff.timestamp();
        let mut inner = self.lock()?;
        let stale: Vec<FeedId> = inner
            .tasked
            .iter()
            .filter(|(_, ts)| **ts <= cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            inner.tasked.remove(id);
            inner.pending.insert(*id);
        }
        Ok(stale)
    }

    async fn sample_pending(&self, max: usize) -> Result<Vec<FeedId>> {
        let inner = self.lock()?;
        let mut ids: Vec<FeedId> = inner.pending.iter().copied().collect();
        drop(inner);

        // Partial Fisher-Yates: the first `take` slots are a uniform sample
        // without replacement
        let take = max.min(ids.len());
        for i in 0..take {
            let j = i + fastrand::usize(..ids.len() - i);
            ids.swap(i, j);
        }
        ids.truncate(take);
        Ok(ids)
    }

    async fn claim(&self, ids: &[FeedId], at: DateTime<Utc>) -> Result<()> {
        let ts = at.timestamp();
        let mut inner = self.lock()?;
        for id in ids {
            inner.pending.remove(id);
            inner.tasked.insert(*id, ts);
        }
        Ok(())
    }

    async fn complete(&self, id: FeedId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.tasked.remove(&id);
        Ok(())
    }

    async fn requeue(&self, id: FeedId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.tasked.remove(&id);
        inner.pending.insert(id);
        Ok(())
    }

    async fn record_fetch(&self, id: FeedId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.fetch_window.push((at.timestamp(), id));
        Ok(())
    }

    async fn prune_fetch_window(&self, before: DateTime<Utc>) -> Result<u64> {
        let cutoff = before.timestamp();
        let mut inner = self.lock()?;
        let len_before = inner.fetch_window.len();
        inner.fetch_window.retain(|(ts, _)| *ts > cutoff);
        Ok((len_before - inner.fetch_window.len()) as u64)
    }

    async fn backlog_add(&self, delta: i64) -> Result<()> {
        let mut inner = self.lock()?;
        inner.backlog = (inner.backlog + delta).max(0);
        Ok(())
    }

    async fn backlog(&self) -> Result<i64> {
        let inner = self.lock()?;
        Ok(inner.backlog.max(0))
    }

    async fn counts(&self) -> Result<LeaseCounts> {
        let inner = self.lock()?;
        Ok(LeaseCounts {
            scheduled: inner.scheduled.len() as u64,
            pending: inner.pending.len() as u64,
            tasked: inner.tasked.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn promote_moves_due_entries_to_pending() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        store.schedule(7, now - Duration::seconds(10)).await.unwrap();
        store.schedule(8, now + Duration::hours(1)).await.unwrap();

        let promoted = store.promote_due(now).await.unwrap();
        assert_eq!(promoted, vec![7]);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.scheduled, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(store.sample_pending(10).await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn promote_is_exhaustive_at_boundary() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        store.schedule(1, now).await.unwrap();
        let promoted = store.promote_due(now).await.unwrap();
        assert_eq!(promoted, vec![1]);
        assert_eq!(store.counts().await.unwrap().scheduled, 0);
    }

    #[tokio::test]
    async fn reclaim_returns_old_tasked_entries() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        store.claim(&[3], now - Duration::hours(7)).await.unwrap();
        store.claim(&[4], now - Duration::hours(1)).await.unwrap();

        let reclaimed = store
            .reclaim_abandoned(now - Duration::hours(6))
            .await
            .unwrap();
        assert_eq!(reclaimed, vec![3]);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.tasked, 1);
        assert!(store.sample_pending(10).await.unwrap().contains(&3));
    }

    #[tokio::test]
    async fn claim_moves_pending_to_tasked() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        store.schedule(5, now - Duration::seconds(1)).await.unwrap();
        store.promote_due(now).await.unwrap();
        store.claim(&[5], now).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.tasked, 1);
    }

    #[tokio::test]
    async fn id_is_never_in_both_pending_and_tasked() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        store.schedule(9, now - Duration::seconds(1)).await.unwrap();
        store.promote_due(now).await.unwrap();
        store.claim(&[9], now).await.unwrap();
        store.requeue(9).await.unwrap();

        let inner = store.inner.lock().unwrap();
        assert!(inner.pending.contains(&9));
        assert!(!inner.tasked.contains_key(&9));
    }

    #[tokio::test]
    async fn claim_of_unpended_id_still_takes_lease() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        // Force/stale candidates come from the catalog, not pending
        store.claim(&[42], now).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.tasked, 1);
    }

    #[tokio::test]
    async fn sample_does_not_remove_and_respects_max() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        for id in 0..20 {
            store.schedule(id, now - Duration::seconds(5)).await.unwrap();
        }
        store.promote_due(now).await.unwrap();

        let sample = store.sample_pending(5).await.unwrap();
        assert_eq!(sample.len(), 5);
        let distinct: HashSet<FeedId> = sample.iter().copied().collect();
        assert_eq!(distinct.len(), 5);
        assert_eq!(store.counts().await.unwrap().pending, 20);

        let all = store.sample_pending(100).await.unwrap();
        assert_eq!(all.len(), 20);
    }

    #[tokio::test]
    async fn requeue_after_failure_restores_pending() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        store.claim(&[42], now).await.unwrap();
        store.requeue(42).await.unwrap();

        assert!(store.sample_pending(10).await.unwrap().contains(&42));
        assert_eq!(store.counts().await.unwrap().tasked, 0);
    }

    #[tokio::test]
    async fn fetch_window_prunes_old_entries() {
        let store = MemoryLeaseStore::new();
        let now = Utc::now();

        store.record_fetch(1, now - Duration::hours(2)).await.unwrap();
        store.record_fetch(2, now).await.unwrap();

        let pruned = store
            .prune_fetch_window(now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
    }

    #[tokio::test]
    async fn backlog_never_goes_negative() {
        let store = MemoryLeaseStore::new();
        store.backlog_add(5).await.unwrap();
        store.backlog_add(-8).await.unwrap();
        assert_eq!(store.backlog().await.unwrap(), 0);
    }
}
