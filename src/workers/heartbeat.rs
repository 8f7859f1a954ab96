//! Heartbeat loop
//!
//! Pings the backend every `heartbeat_interval`. Failures are logged and
//! retried on the next tick.

use super::{pause, WorkerContext};
use crate::error::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn run(ctx: Arc<WorkerContext>, cancel: CancellationToken) -> Result<()> {
    info!("Starting heartbeat loop");
    let interval = ctx.settings.heartbeat_interval;

    loop {
        match ctx.store.node_id().await {
            Some(node_id) => {
                let sent = tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = ctx.remote.heartbeat(&node_id) => sent,
                };
                match sent {
                    Ok(()) => debug!(node_id = %node_id, "Heartbeat sent"),
                    Err(e) => warn!(node_id = %node_id, error = %e, "Heartbeat failed"),
                }
            }
            None => warn!("Node not registered, heartbeat skipped"),
        }

        if !pause(&cancel, interval).await {
            break;
        }
    }

    info!("Heartbeat loop stopped");
    Ok(())
}
