//! IPC Client for connecting to the scheduler daemon

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::protocol::*;
use crate::feed::{Feed, FeedId};
use crate::{Error, Result};

/// Client for communicating with the daemon
#[derive(Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Create a new daemon client
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Check if daemon is running by sending a ping
    pub async fn ping(&self) -> Result<bool> {
        match self.call(methods::PING, serde_json::Value::Null).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    /// Get daemon status
    pub async fn status(&self) -> Result<StatusResponse> {
        let result = self.call(methods::STATUS, serde_json::Value::Null).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Run one scheduler tick
    pub async fn run_tick(&self) -> Result<TickResponse> {
        let result = self.call(methods::TICK_RUN, serde_json::Value::Null).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Submit a regular update batch
    pub async fn update_feeds(&self, feed_ids: Vec<FeedId>) -> Result<BatchResponse> {
        let params = serde_json::json!({ "feed_ids": feed_ids });
        let result = self.call(methods::FEEDS_UPDATE, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Submit a forced batch for newly added feeds
    pub async fn new_feeds(&self, feed_ids: Vec<FeedId>) -> Result<BatchResponse> {
        let params = serde_json::json!({ "feed_ids": feed_ids });
        let result = self.call(methods::FEEDS_NEW, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Push pre-fetched content for a single feed
    pub async fn push_update(&self, feed_id: FeedId, content: String) -> Result<()> {
        let params = serde_json::json!({ "feed_id": feed_id, "content": content });
        self.call(methods::FEED_PUSH, params).await?;
        Ok(())
    }

    /// Schedule immediate fetches
    pub async fn schedule_immediate(&self, feed_ids: Vec<FeedId>) -> Result<()> {
        let params = serde_json::json!({ "feed_ids": feed_ids });
        self.call(methods::FEEDS_SCHEDULE_IMMEDIATE, params).await?;
        Ok(())
    }

    /// Set up feeds for premium subscribers
    pub async fn premium_setup(&self, feed_ids: Vec<FeedId>) -> Result<()> {
        let params = serde_json::json!({ "feed_ids": feed_ids });
        self.call(methods::FEEDS_PREMIUM_SETUP, params).await?;
        Ok(())
    }

    /// Register a new feed
    pub async fn add_feed(&self, url: &str, title: Option<&str>) -> Result<Feed> {
        let params = serde_json::json!({ "url": url, "title": title });
        let result = self.call(methods::FEED_ADD, params).await?;
        let response: FeedAddResponse = serde_json::from_value(result)?;
        Ok(response.feed)
    }

    /// List all feeds
    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let result = self.call(methods::FEED_LIST, serde_json::Value::Null).await?;
        let response: FeedListResponse = serde_json::from_value(result)?;
        Ok(response.feeds)
    }

    /// Send a request and receive a response
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::Other(format!(
                "Failed to connect to daemon at {}: {}. Is the daemon running?",
                self.socket_path.display(),
                e
            ))
        })?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request = Request::new(method).with_params(params);
        let request_json = serde_json::to_string(&request)?;

        writer.write_all(request_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut response_line = String::new();
        reader.read_line(&mut response_line).await?;

        let response: Response = serde_json::from_str(&response_line)?;

        if let Some(error) = response.error {
            return Err(Error::Other(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        response
            .result
            .ok_or_else(|| Error::Other("Empty response".to_string()))
    }
}

/// Check if daemon is reachable
pub async fn is_daemon_running(socket_path: &std::path::Path) -> bool {
    let client = DaemonClient::new(socket_path.to_path_buf());
    client.ping().await.unwrap_or(false)
}
