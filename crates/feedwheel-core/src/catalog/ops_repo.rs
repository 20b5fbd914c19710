use chrono::Utc;

use super::Database;
use crate::feed::OpsSnapshot;
use crate::Result;

/// Operational flag keys
pub const REPLICATION_LAG: &str = "mongodb_replication_lag";
pub const FAKE_FETCH: &str = "fake_fetch";
pub const QUICK_FETCH: &str = "quick_fetch";

/// Read-only access to operational flags for the scheduling core.
/// Writes exist for operators and tests.
pub struct OpsRepository<'a> {
    db: &'a Database,
}

impl<'a> OpsRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Look up a single flag value
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM op_flags WHERE key = ?")
                .bind(key)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a flag value
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO op_flags (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                           updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Read all flags into a snapshot. Unparseable or missing values fall
    /// back to defaults; a broken flag must not stop scheduling.
    pub async fn load_snapshot(&self) -> Result<OpsSnapshot> {
        let replication_lag_secs = self
            .get(REPLICATION_LAG)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let fake_fetch = self
            .get(FAKE_FETCH)
            .await?
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let quick_fetch = self
            .get(QUICK_FETCH)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);

        Ok(OpsSnapshot {
            replication_lag_secs,
            fake_fetch,
            quick_fetch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_defaults_when_unset() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = OpsRepository::new(&db);

        let snapshot = repo.load_snapshot().await.unwrap();
        assert_eq!(snapshot.replication_lag_secs, 0);
        assert!(!snapshot.fake_fetch);
        assert_eq!(snapshot.quick_fetch, 0.0);
    }

    #[tokio::test]
    async fn snapshot_reads_set_values() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = OpsRepository::new(&db);

        repo.set(REPLICATION_LAG, "42").await.unwrap();
        repo.set(FAKE_FETCH, "true").await.unwrap();
        repo.set(QUICK_FETCH, "1.5").await.unwrap();

        let snapshot = repo.load_snapshot().await.unwrap();
        assert_eq!(snapshot.replication_lag_secs, 42);
        assert!(snapshot.fake_fetch);
        assert_eq!(snapshot.quick_fetch, 1.5);
    }

    #[tokio::test]
    async fn unparseable_values_fall_back() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = OpsRepository::new(&db);

        repo.set(REPLICATION_LAG, "not-a-number").await.unwrap();

        let snapshot = repo.load_snapshot().await.unwrap();
        assert_eq!(snapshot.replication_lag_secs, 0);
    }
}
