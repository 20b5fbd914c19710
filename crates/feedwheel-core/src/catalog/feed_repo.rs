use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::Database;
use crate::feed::{Feed, FeedId, NewFeed};
use crate::{Error, Result};

/// Repository for feed catalog operations
pub struct FeedRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct FeedRow {
    id: i64,
    url: String,
    title: Option<String>,
    active: bool,
    fetched_once: bool,
    active_subscriber_count: i64,
    next_scheduled_update: Option<DateTime<Utc>>,
    last_fetched_at: Option<DateTime<Utc>>,
    fetch_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            url: row.url,
            title: row.title,
            active: row.active,
            fetched_once: row.fetched_once,
            active_subscriber_count: row.active_subscriber_count,
            next_scheduled_update: row.next_scheduled_update,
            last_fetched_at: row.last_fetched_at,
            fetch_error: row.fetch_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const FEED_COLUMNS: &str = "id, url, title, active, fetched_once, active_subscriber_count, \
     next_scheduled_update, last_fetched_at, fetch_error, created_at, updated_at";

impl<'a> FeedRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a new feed
    pub async fn create(&self, new_feed: &NewFeed) -> Result<Feed> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO feeds (url, title, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&new_feed.url)
        .bind(&new_feed.title)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or(Error::FeedNotFound(id))
    }

    /// Find a feed by ID
    pub async fn find_by_id(&self, id: FeedId) -> Result<Option<Feed>> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feeds WHERE id = ?",
            FEED_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Feed::from))
    }

    /// Get all feeds
    pub async fn list_all(&self) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feeds ORDER BY id ASC",
            FEED_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Active feeds that have never been fetched and have at least one
    /// subscriber, in uniform random order
    pub async fn never_fetched(&self, limit: u32) -> Result<Vec<FeedId>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM feeds
            WHERE active = 1 AND fetched_once = 0 AND active_subscriber_count >= 1
            ORDER BY RANDOM()
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Subscribed feeds whose schedule entry was lost or delayed past
    /// `older_than`, in uniform random order
    pub async fn stale_scheduled(
        &self,
        older_than: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<FeedId>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM feeds
            WHERE next_scheduled_update <= ? AND active_subscriber_count >= 1
            ORDER BY RANDOM()
            LIMIT ?
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Record a successful update
    pub async fn record_success(
        &self,
        id: FeedId,
        title: Option<&str>,
        next_due: DateTime<Utc>,
    ) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE feeds
            SET title = COALESCE(?, title),
                fetched_once = 1,
                last_fetched_at = ?,
                next_scheduled_update = ?,
                fetch_error = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(now)
        .bind(next_due)
        .bind(now)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Record a failed update
    pub async fn record_failure(&self, id: FeedId, error: &str) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE feeds
            SET fetch_error = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Overwrite a feed's next due time
    pub async fn set_next_scheduled_update(
        &self,
        id: FeedId,
        due: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE feeds SET next_scheduled_update = ?, updated_at = ? WHERE id = ?")
            .bind(due)
            .bind(Utc::now())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Activate feeds for newly subscribed premium users: ensure they are
    /// active with at least one counted subscriber
    pub async fn setup_for_subscribers(&self, ids: &[FeedId]) -> Result<u64> {
        let mut updated = 0;
        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE feeds
                SET active = 1,
                    active_subscriber_count = MAX(active_subscriber_count, 1),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(Utc::now())
            .bind(id)
            .execute(self.db.pool())
            .await?;
            updated += result.rows_affected();
        }
        Ok(updated)
    }

    /// Get total feed count
    pub async fn count(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0 as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn seed_feed(repo: &FeedRepository<'_>, url: &str) -> Feed {
        repo.create(&NewFeed {
            url: url.to_string(),
            title: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_and_find() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);

        let feed = seed_feed(&repo, "https://example.com/rss").await;
        assert!(feed.active);
        assert!(!feed.fetched_once);

        let found = repo.find_by_id(feed.id).await.unwrap().unwrap();
        assert_eq!(found.url, "https://example.com/rss");

        assert!(repo.find_by_id(99_999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn never_fetched_filters_and_caps() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);

        for i in 0..5 {
            let feed = seed_feed(&repo, &format!("https://example.com/{i}")).await;
            repo.setup_for_subscribers(&[feed.id]).await.unwrap();
        }
        // One without subscribers: must not be selected
        seed_feed(&repo, "https://example.com/unsubscribed").await;

        let candidates = repo.never_fetched(100).await.unwrap();
        assert_eq!(candidates.len(), 5);

        let capped = repo.never_fetched(3).await.unwrap();
        assert_eq!(capped.len(), 3);
    }

    #[tokio::test]
    async fn never_fetched_excludes_fetched_feeds() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);

        let feed = seed_feed(&repo, "https://example.com/rss").await;
        repo.setup_for_subscribers(&[feed.id]).await.unwrap();
        repo.record_success(feed.id, Some("Example"), Utc::now())
            .await
            .unwrap();

        assert!(repo.never_fetched(100).await.unwrap().is_empty());

        let found = repo.find_by_id(feed.id).await.unwrap().unwrap();
        assert!(found.fetched_once);
        assert_eq!(found.title.as_deref(), Some("Example"));
    }

    #[tokio::test]
    async fn stale_scheduled_returns_overdue_subscribed_feeds() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);
        let now = Utc::now();

        let stale = seed_feed(&repo, "https://example.com/stale").await;
        repo.setup_for_subscribers(&[stale.id]).await.unwrap();
        repo.set_next_scheduled_update(stale.id, now - Duration::days(4))
            .await
            .unwrap();

        let fresh = seed_feed(&repo, "https://example.com/fresh").await;
        repo.setup_for_subscribers(&[fresh.id]).await.unwrap();
        repo.set_next_scheduled_update(fresh.id, now - Duration::hours(1))
            .await
            .unwrap();

        let candidates = repo
            .stale_scheduled(now - Duration::days(3), 100)
            .await
            .unwrap();
        assert_eq!(candidates, vec![stale.id]);
    }

    #[tokio::test]
    async fn record_failure_keeps_feed_intact() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = FeedRepository::new(&db);

        let feed = seed_feed(&repo, "https://example.com/rss").await;
        repo.record_failure(feed.id, "connection refused")
            .await
            .unwrap();

        let found = repo.find_by_id(feed.id).await.unwrap().unwrap();
        assert!(found.has_error());
        assert!(!found.fetched_once);
    }
}
