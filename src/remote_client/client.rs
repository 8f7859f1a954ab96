//! HTTP RemoteClient
//!
//! JSON over HTTP(S). Every request goes through `send_with_retry`, which
//! retries 500/502/503/504 with exponential backoff and honours a
//! `Retry-After` header given in seconds.

use super::types::*;
use super::RemoteClient;
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::state_store::EventStatus;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// reqwest-based backend client
#[derive(Clone)]
pub struct HttpRemoteClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpRemoteClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .build()?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&config.base_url),
            retry: RetryPolicy {
                max_retries: config.retry_attempts,
                backoff_factor: config.retry_backoff_factor,
            },
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send the request built by `build`, retrying server-side failures
    async fn send_with_retry<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let response = build().send().await.map_err(|e| {
                error!(operation = operation, error = %e, "HTTP request failed");
                Error::Network(format!("{}: {}", operation, e))
            })?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if RetryPolicy::is_retryable(status.as_u16()) && attempt < self.retry.max_retries {
                let delay = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after)
                    .unwrap_or_else(|| self.retry.delay_for(attempt));

                warn!(
                    operation = operation,
                    status = %status,
                    attempt = attempt + 1,
                    max_retries = self.retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            error!(
                operation = operation,
                status = %status,
                body = %body,
                "Request rejected"
            );
            return Err(Error::Api(format!("{} returned {}: {}", operation, status, body)));
        }
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn register_node(&self, info: &NodeRegistration) -> Result<String> {
        let url = self.url(endpoints::EDGE_NODE);
        debug!(url = %url, node_name = %info.node_name, "Registering node");

        let response = self
            .send_with_retry("register_node", || self.http.post(&url).json(info))
            .await?;
        let body: RegisterResponse = response.json().await?;

        match body.node_id.filter(|id| !id.is_empty()) {
            Some(node_id) => {
                info!(node_id = %node_id, "Node registered successfully");
                Ok(node_id)
            }
            None => {
                error!("Node registration failed: node_id not found in the response");
                Err(Error::Api("node_id missing from registration response".to_string()))
            }
        }
    }

    async fn heartbeat(&self, node_id: &str) -> Result<()> {
        let url = self.url(endpoints::HEARTBEAT);
        let body = HeartbeatRequest { node_id };
        self.send_with_retry("heartbeat", || self.http.put(&url).json(&body))
            .await?;
        debug!(node_id = %node_id, "Heartbeat sent");
        Ok(())
    }

    async fn send_event(&self, report: &EventReport) -> Result<String> {
        let url = self.url(endpoints::EVENT);
        debug!(
            url = %url,
            size_kib = report.image_kib(),
            "Sending accident event"
        );

        let response = self
            .send_with_retry("send_event", || self.http.post(&url).json(report))
            .await?;
        let body: EventResponse = response.json().await?;

        match body.event_id.filter(|id| !id.is_empty()) {
            Some(event_id) => {
                info!(event_id = %event_id, "Accident reported successfully");
                Ok(event_id)
            }
            None => {
                error!("Failed to obtain event_id from the response");
                Err(Error::Api("event_id missing from event response".to_string()))
            }
        }
    }

    async fn poll_status(&self, event_id: &str) -> EventStatus {
        let url = self.url(endpoints::EVENT);
        let result = async {
            let response = self
                .send_with_retry("poll_status", || {
                    self.http.get(&url).query(&[("event_id", event_id)])
                })
                .await?;
            let body: StatusResponse = response.json().await?;
            Ok::<_, Error>(body.event_status)
        }
        .await;

        match result {
            Ok(Some(raw)) => {
                let status = EventStatus::from_remote(&raw);
                info!(event_id = %event_id, status = %raw, "Checked accident status");
                status
            }
            Ok(None) => {
                warn!(event_id = %event_id, "Status response without event_status");
                EventStatus::Unknown
            }
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Error while checking accident status");
                EventStatus::Unknown
            }
        }
    }

    async fn update_event_status(&self, event_id: &str, status: EventStatus) -> Result<()> {
        let url = self.url(endpoints::EVENT);
        let body = EventStatusRequest {
            event_id,
            event_status: status.as_str(),
        };
        self.send_with_retry("update_event_status", || self.http.put(&url).json(&body))
            .await?;
        info!(event_id = %event_id, status = %status, "Event status updated");
        Ok(())
    }

    async fn set_node_status(&self, node_id: &str, status: NodeStatus) -> Result<()> {
        let url = self.url(endpoints::EDGE_NODE);
        let body = NodeStatusRequest {
            node_id,
            node_status: status,
        };
        self.send_with_retry("set_node_status", || self.http.put(&url).json(&body))
            .await?;
        info!(node_id = %node_id, status = %status, "Node status updated");
        Ok(())
    }
}

fn normalize_base_url(base: &str) -> String {
    let trimmed = base.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}
