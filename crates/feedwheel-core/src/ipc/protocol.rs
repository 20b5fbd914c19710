//! IPC Protocol definitions for daemon-client communication
//!
//! Uses JSON-RPC style request/response format over Unix socket.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feed::{Feed, FeedId};

/// JSON-RPC style request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// JSON-RPC style response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Uuid, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Uuid, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn ok(id: Uuid) -> Self {
        Self::success(id, serde_json::json!({"ok": true}))
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

// Error codes
pub const ERR_PARSE: i32 = -32700;
pub const ERR_INVALID_REQUEST: i32 = -32600;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_INTERNAL: i32 = -32603;
pub const ERR_DAEMON_NOT_RUNNING: i32 = -32000;

// Method names
pub mod methods {
    pub const PING: &str = "ping";
    pub const STATUS: &str = "status";

    // Scheduling methods
    pub const TICK_RUN: &str = "tick.run";
    pub const FEEDS_UPDATE: &str = "feeds.update";
    pub const FEEDS_NEW: &str = "feeds.new";
    pub const FEED_PUSH: &str = "feed.push";
    pub const FEEDS_SCHEDULE_IMMEDIATE: &str = "feeds.schedule_immediate";
    pub const FEEDS_PREMIUM_SETUP: &str = "feeds.premium_setup";

    // Catalog methods
    pub const FEED_ADD: &str = "feed.add";
    pub const FEED_LIST: &str = "feed.list";
}

// Parameter structures

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedIdsParams {
    pub feed_ids: Vec<FeedId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushParams {
    pub feed_id: FeedId,
    /// Pre-fetched document body (UTF-8 text)
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedAddParams {
    pub url: String,
    pub title: Option<String>,
}

// Response structures

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub uptime_secs: u64,
    pub scheduled: u64,
    pub pending: u64,
    pub tasked: u64,
    pub backlog: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResponse {
    pub promoted: usize,
    pub reclaimed: usize,
    pub regular: usize,
    pub force: usize,
    pub stale: usize,
    pub updated: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub updated: u32,
    pub skipped: u32,
    pub missing: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedListResponse {
    pub feeds: Vec<Feed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedAddResponse {
    pub feed: Feed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::new("ping");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"method\":\"ping\""));
    }

    #[test]
    fn test_response_success() {
        let id = Uuid::new_v4();
        let resp = Response::ok(id);
        assert!(resp.is_success());
    }

    #[test]
    fn test_response_error() {
        let id = Uuid::new_v4();
        let resp = Response::error(id, ERR_METHOD_NOT_FOUND, "Method not found");
        assert!(!resp.is_success());
        assert_eq!(resp.error.unwrap().code, ERR_METHOD_NOT_FOUND);
    }

    #[test]
    fn test_feed_ids_params_roundtrip() {
        let params = FeedIdsParams {
            feed_ids: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&params).unwrap();
        let parsed: FeedIdsParams = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.feed_ids, vec![1, 2, 3]);
    }
}
