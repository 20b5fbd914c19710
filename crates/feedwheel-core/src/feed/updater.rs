use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::{Client, Proxy};

use super::models::{Feed, UpdateOptions};
use crate::catalog::{Database, FeedRepository};
use crate::config::AppConfig;
use crate::lease::LeaseStore;
use crate::{Error, Result};

const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;

/// Outcome of a single feed update
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    /// Number of entries seen in the fetched document
    pub entries: usize,
    /// True when the fetch was skipped (fresh feed without force, or fake run)
    pub skipped: bool,
}

/// External fetch/update collaborator.
///
/// Implementations fetch and apply one feed's content; the scheduling core
/// never touches the network itself.
#[async_trait]
pub trait FeedUpdater: Send + Sync {
    /// Fetch the feed and apply the result to the catalog
    async fn update(&self, feed: &Feed, options: &UpdateOptions) -> Result<UpdateOutcome>;

    /// Apply externally supplied content (e.g. a webhook push) without fetching
    async fn apply(
        &self,
        feed: &Feed,
        content: Bytes,
        options: &UpdateOptions,
    ) -> Result<UpdateOutcome>;
}

/// Feed updater backed by an HTTP client and the feed catalog
pub struct HttpFeedUpdater {
    client: Client,
    db: Database,
    store: Arc<dyn LeaseStore>,
    update_interval_secs: u64,
    update_jitter_secs: u64,
}

impl HttpFeedUpdater {
    /// Create a new updater with a shared HTTP client
    pub fn new(config: &AppConfig, db: Database, store: Arc<dyn LeaseStore>) -> Result<Self> {
        let client = Self::build_client(
            config.fetch.request_timeout_secs,
            &config.fetch.proxy_url,
        )?;

        Ok(Self {
            client,
            db,
            store,
            update_interval_secs: config.fetch.update_interval_secs,
            update_jitter_secs: config.fetch.update_jitter_secs,
        })
    }

    /// Build HTTP client with optional proxy
    fn build_client(timeout_secs: u64, proxy_url: &Option<String>) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(ref proxy) = proxy_url {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::info!("Using HTTP proxy for feed fetching");
        }

        builder.build().map_err(Error::Http)
    }

    /// Next due time: base interval plus uniform jitter so a large catalog
    /// does not thundering-herd onto the same tick
    fn next_due(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let jitter = if self.update_jitter_secs > 0 {
            fastrand::u64(0..=self.update_jitter_secs)
        } else {
            0
        };
        now + chrono::Duration::seconds((self.update_interval_secs + jitter) as i64)
    }

    /// Whether the feed is fresh enough to skip without `force`
    fn is_fresh(&self, feed: &Feed, now: DateTime<Utc>) -> bool {
        match feed.next_scheduled_update {
            Some(due) => due > now,
            None => false,
        }
    }

    async fn fetch_body(&self, feed: &Feed, options: &UpdateOptions) -> Result<Bytes> {
        let mut request = self.client.get(&feed.url);
        if options.quick > 0.0 {
            request = request.timeout(Duration::from_secs_f64(options.quick));
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.bytes().await?;
        if body.len() > MAX_FEED_BYTES {
            return Err(Error::FeedParse(format!(
                "feed body too large: {} bytes",
                body.len()
            )));
        }
        Ok(body)
    }

    /// Parse the document, persist the result and reschedule the feed
    async fn apply_content(
        &self,
        feed: &Feed,
        content: &[u8],
        options: &UpdateOptions,
    ) -> Result<UpdateOutcome> {
        let parsed = parser::parse(content).map_err(|e| Error::FeedParse(e.to_string()))?;
        let title = parsed.title.map(|t| t.content);
        let entries = parsed.entries.len();

        if options.compute_scores {
            tracing::debug!(feed_id = feed.id, entries, "Recomputing relevance scores");
        } else {
            tracing::debug!(
                feed_id = feed.id,
                lag_secs = options.replication_lag_secs,
                "Skipping score recomputation (replication lag)"
            );
        }

        let now = Utc::now();
        let next_due = self.next_due(now);
        let repo = FeedRepository::new(&self.db);
        repo.record_success(feed.id, title.as_deref(), next_due).await?;
        self.store.schedule(feed.id, next_due).await?;

        Ok(UpdateOutcome {
            entries,
            skipped: false,
        })
    }
}

#[async_trait]
impl FeedUpdater for HttpFeedUpdater {
    async fn update(&self, feed: &Feed, options: &UpdateOptions) -> Result<UpdateOutcome> {
        let now = Utc::now();

        if !options.force && self.is_fresh(feed, now) {
            tracing::debug!(feed_id = feed.id, "Feed still fresh, skipping fetch");
            return Ok(UpdateOutcome {
                entries: 0,
                skipped: true,
            });
        }

        if options.fake {
            // Operational dry-run: reschedule without touching the network
            let next_due = self.next_due(now);
            let repo = FeedRepository::new(&self.db);
            repo.set_next_scheduled_update(feed.id, next_due).await?;
            self.store.schedule(feed.id, next_due).await?;
            return Ok(UpdateOutcome {
                entries: 0,
                skipped: true,
            });
        }

        let body = match self.fetch_body(feed, options).await {
            Ok(body) => body,
            Err(e) => {
                let repo = FeedRepository::new(&self.db);
                repo.record_failure(feed.id, &e.to_string()).await?;
                return Err(e);
            }
        };

        self.apply_content(feed, &body, options).await
    }

    async fn apply(
        &self,
        feed: &Feed,
        content: Bytes,
        options: &UpdateOptions,
    ) -> Result<UpdateOutcome> {
        self.apply_content(feed, &content, options).await
    }
}
