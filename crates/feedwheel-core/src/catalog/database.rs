use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use crate::config::AppConfig;
use crate::Result;

/// Database connection pool wrapper for the feed catalog
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let db_path = config.database_path();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}", db_path.display());

        tracing::info!("Connecting to catalog database: {}", db_path.display());

        // Set PRAGMAs per-connection so every connection in the pool has the
        // correct settings
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(15)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        tracing::info!("Running catalog migrations...");

        sqlx::query(MIGRATION_001_FEEDS).execute(&self.pool).await?;
        sqlx::query(MIGRATION_002_OP_FLAGS)
            .execute(&self.pool)
            .await?;
        sqlx::query(MIGRATION_INDEXES).execute(&self.pool).await?;

        tracing::info!("Catalog migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

const MIGRATION_001_FEEDS: &str = r#"
CREATE TABLE IF NOT EXISTS feeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    fetched_once INTEGER NOT NULL DEFAULT 0,
    active_subscriber_count INTEGER NOT NULL DEFAULT 0,
    next_scheduled_update DATETIME,
    last_fetched_at DATETIME,
    fetch_error TEXT,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

const MIGRATION_002_OP_FLAGS: &str = r#"
CREATE TABLE IF NOT EXISTS op_flags (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

const MIGRATION_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_feeds_unfetched
    ON feeds(active, fetched_once, active_subscriber_count);
CREATE INDEX IF NOT EXISTS idx_feeds_next_update
    ON feeds(next_scheduled_update)
"#;
