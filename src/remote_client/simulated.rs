//! Simulated RemoteClient for debug mode
//!
//! Logs every call and answers with fixed ids. Polls report `validated`
//! so the cooldown path can be exercised without a backend.

use super::types::*;
use super::RemoteClient;
use crate::error::Result;
use crate::state_store::EventStatus;
use async_trait::async_trait;
use tracing::info;

pub const SIMULATED_NODE_ID: &str = "simulated-node-id";
pub const SIMULATED_EVENT_ID: &str = "simulated-event-id";

#[derive(Debug, Clone, Default)]
pub struct SimulatedRemoteClient;

impl SimulatedRemoteClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteClient for SimulatedRemoteClient {
    async fn register_node(&self, info: &NodeRegistration) -> Result<String> {
        info!(
            node_name = %info.node_name,
            latitude = info.latitude,
            longitude = info.longitude,
            "[SIMULATED] register node"
        );
        Ok(SIMULATED_NODE_ID.to_string())
    }

    async fn heartbeat(&self, node_id: &str) -> Result<()> {
        info!(node_id = %node_id, "[SIMULATED] heartbeat");
        Ok(())
    }

    async fn send_event(&self, report: &EventReport) -> Result<String> {
        info!(
            edge_node_id = %report.edge_node_id,
            event_timestamp = %report.event_timestamp,
            size_kib = report.image_kib(),
            "[SIMULATED] send event"
        );
        Ok(SIMULATED_EVENT_ID.to_string())
    }

    async fn poll_status(&self, event_id: &str) -> EventStatus {
        info!(event_id = %event_id, "[SIMULATED] poll status -> validated");
        EventStatus::Validated
    }

    async fn update_event_status(&self, event_id: &str, status: EventStatus) -> Result<()> {
        info!(event_id = %event_id, status = %status, "[SIMULATED] update event status");
        Ok(())
    }

    async fn set_node_status(&self, node_id: &str, status: NodeStatus) -> Result<()> {
        info!(node_id = %node_id, status = %status, "[SIMULATED] set node status");
        Ok(())
    }
}
