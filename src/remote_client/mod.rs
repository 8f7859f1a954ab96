//! RemoteClient - Backend communication
//!
//! ## Responsibilities
//!
//! - Node registration, heartbeat, node status
//! - Accident event report / status poll / status update
//! - Transport retry (5xx only, exponential backoff, `Retry-After`)
//!
//! The core only sees the `RemoteClient` trait; each call is one logical
//! request that already absorbed transport-level retries.
//!
//! ## Implementations
//! - `client`: reqwest-based HTTP client
//! - `simulated`: debug-mode client that logs calls and returns fixed ids

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod simulated;
pub mod types;

pub use client::HttpRemoteClient;
pub use simulated::SimulatedRemoteClient;
pub use types::*;

use crate::error::Result;
use crate::state_store::EventStatus;
use async_trait::async_trait;

/// Backend operations consumed by the core
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Register this node, returning the backend-assigned node id
    async fn register_node(&self, info: &NodeRegistration) -> Result<String>;

    /// Liveness ping
    async fn heartbeat(&self, node_id: &str) -> Result<()>;

    /// Report an accident, returning the backend event id
    async fn send_event(&self, report: &EventReport) -> Result<String>;

    /// Current adjudication status. Transport failures surface as `Unknown`.
    async fn poll_status(&self, event_id: &str) -> EventStatus;

    /// Push a status decided locally (auto-resolution)
    async fn update_event_status(&self, event_id: &str, status: EventStatus) -> Result<()>;

    /// Set node status (`online` once an event is closed)
    async fn set_node_status(&self, node_id: &str, status: NodeStatus) -> Result<()>;
}
