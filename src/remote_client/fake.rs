//! Scripted RemoteClient for unit tests

use super::types::*;
use super::RemoteClient;
use crate::error::{Error, Result};
use crate::state_store::EventStatus;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeRemote {
    /// Poll answers consumed in order; `fallback` once empty
    pub polls: Mutex<VecDeque<EventStatus>>,
    pub fallback: EventStatus,
    /// Time `send_event` takes before answering
    pub send_delay: Mutex<Duration>,
    pub fail_send: AtomicBool,
    pub fail_heartbeat: AtomicBool,
    pub fail_register: AtomicBool,
    pub registrations: AtomicUsize,
    pub heartbeats: AtomicUsize,
    pub sent: AtomicUsize,
    pub polled: AtomicUsize,
    pub event_updates: Mutex<Vec<(String, EventStatus)>>,
    pub node_updates: Mutex<Vec<(String, NodeStatus)>>,
}

impl FakeRemote {
    pub fn new(fallback: EventStatus) -> Self {
        Self {
            polls: Mutex::new(VecDeque::new()),
            fallback,
            send_delay: Mutex::new(Duration::ZERO),
            fail_send: AtomicBool::new(false),
            fail_heartbeat: AtomicBool::new(false),
            fail_register: AtomicBool::new(false),
            registrations: AtomicUsize::new(0),
            heartbeats: AtomicUsize::new(0),
            sent: AtomicUsize::new(0),
            polled: AtomicUsize::new(0),
            event_updates: Mutex::new(Vec::new()),
            node_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, polls: &[EventStatus]) -> Self {
        self.polls.lock().unwrap().extend(polls.iter().copied());
        self
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn polled(&self) -> usize {
        self.polled.load(Ordering::SeqCst)
    }

    pub fn event_updates(&self) -> Vec<(String, EventStatus)> {
        self.event_updates.lock().unwrap().clone()
    }

    pub fn node_updates(&self) -> Vec<(String, NodeStatus)> {
        self.node_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn register_node(&self, _info: &NodeRegistration) -> Result<String> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok("node-fake".to_string())
    }

    async fn heartbeat(&self, _node_id: &str) -> Result<()> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        if self.fail_heartbeat.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(())
    }

    async fn send_event(&self, _report: &EventReport) -> Result<String> {
        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::Api("event rejected".to_string()));
        }
        Ok(format!("evt-{}", n))
    }

    async fn poll_status(&self, _event_id: &str) -> EventStatus {
        self.polled.fetch_add(1, Ordering::SeqCst);
        let scripted = self.polls.lock().unwrap().pop_front();
        scripted.unwrap_or(self.fallback)
    }

    async fn update_event_status(&self, event_id: &str, status: EventStatus) -> Result<()> {
        self.event_updates
            .lock()
            .unwrap()
            .push((event_id.to_string(), status));
        Ok(())
    }

    async fn set_node_status(&self, node_id: &str, status: NodeStatus) -> Result<()> {
        self.node_updates
            .lock()
            .unwrap()
            .push((node_id.to_string(), status));
        Ok(())
    }
}
