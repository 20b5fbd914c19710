//! Admission control: refuse new regular intake when the downstream backlog
//! is high. Force and stale batches are never throttled.

use crate::lease::LeaseStore;
use crate::Result;

/// Weight applied to the backlog gauge before comparing to the threshold
pub const BACKLOG_MULTIPLIER: i64 = 12;

/// Weighted backlog at or above this stops regular intake for the tick
pub const BACKLOG_THRESHOLD: i64 = 1000;

/// Pure throttle decision for a given backlog reading
pub fn is_throttled(backlog: i64) -> bool {
    backlog * BACKLOG_MULTIPLIER >= BACKLOG_THRESHOLD
}

/// Read the backlog gauge and decide whether to skip regular intake
pub async fn should_throttle(store: &dyn LeaseStore) -> Result<bool> {
    Ok(is_throttled(store.backlog().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::MemoryLeaseStore;

    #[test]
    fn throttles_at_and_above_threshold() {
        // 84 * 12 = 1008 >= 1000
        assert!(is_throttled(84));
        // 83 * 12 = 996 < 1000
        assert!(!is_throttled(83));
        assert!(!is_throttled(0));
        assert!(is_throttled(1_000_000));
    }

    #[tokio::test]
    async fn reads_gauge_from_store() {
        let store = MemoryLeaseStore::new();
        assert!(!should_throttle(&store).await.unwrap());

        store.backlog_add(84).await.unwrap();
        assert!(should_throttle(&store).await.unwrap());
    }
}
