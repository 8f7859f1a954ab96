//! RemoteClient type definitions
//!
//! Request payloads follow the backend's snake_case JSON contract.

use crate::state_store::NodeIdentity;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================
// Constants
// ============================================================

/// Event type string expected by the backend
pub const EVENT_TYPE: &str = "car accident";

/// Endpoint paths relative to `api.base_url`
pub mod endpoints {
    pub const EDGE_NODE: &str = "edge-node";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const EVENT: &str = "event";
}

/// Server-side statuses that are retried
pub const RETRYABLE_STATUS: [u16; 4] = [500, 502, 503, 504];

/// Upper bound for any single retry delay, including `Retry-After`
pub const MAX_RETRY_DELAY_SECS: u64 = 120;

// ============================================================
// Node
// ============================================================

/// Node status values understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Sent at registration
    Active,
    /// Node is back on duty after an event closed
    Online,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Online => write!(f, "online"),
        }
    }
}

/// Registration request body
#[derive(Debug, Clone, Serialize)]
pub struct NodeRegistration {
    pub node_status: NodeStatus,
    pub node_name: String,
    /// Pre-configured id, empty when the backend should assign one
    pub node_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct HeartbeatRequest<'a> {
    pub node_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NodeStatusRequest<'a> {
    pub node_id: &'a str,
    pub node_status: NodeStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RegisterResponse {
    #[serde(default)]
    pub node_id: Option<String>,
}

// ============================================================
// Event
// ============================================================

/// Accident report body
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub event_type: String,
    pub edge_node_id: String,
    /// Stringified UNIX seconds
    pub event_timestamp: String,
    pub event_status: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Base64 JPEG
    pub image: String,
}

impl EventReport {
    pub fn new(node: &NodeIdentity, jpeg: &[u8], at: DateTime<Utc>) -> Self {
        Self {
            event_type: EVENT_TYPE.to_string(),
            edge_node_id: node.node_id.clone(),
            event_timestamp: at.timestamp().to_string(),
            event_status: "reported".to_string(),
            latitude: node.latitude,
            longitude: node.longitude,
            image: base64::engine::general_purpose::STANDARD.encode(jpeg),
        }
    }

    /// Approximate payload size in KiB (for logs)
    pub fn image_kib(&self) -> f64 {
        self.image.len() as f64 / 1024.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EventStatusRequest<'a> {
    pub event_id: &'a str,
    pub event_status: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EventResponse {
    #[serde(default)]
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusResponse {
    #[serde(default)]
    pub event_status: Option<String>,
}

// ============================================================
// Retry policy
// ============================================================

/// Transport retry policy: bounded count, exponential backoff, 5xx only
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `factor * 2^attempt` seconds
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor * 2f64.powi(attempt.min(16) as i32);
        if !secs.is_finite() {
            return Duration::from_secs(MAX_RETRY_DELAY_SECS);
        }
        Duration::from_secs_f64(secs.clamp(0.0, MAX_RETRY_DELAY_SECS as f64))
    }

    pub fn is_retryable(status: u16) -> bool {
        RETRYABLE_STATUS.contains(&status)
    }
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_DELAY_SECS)))
}
