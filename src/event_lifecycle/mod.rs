//! EventLifecycleController - Accident report state machine
//!
//! ## Responsibilities
//!
//! - Idle -> Reported: send the event once a detection is confirmed
//! - Reported: poll until the backend validates or closes the event
//! - Validated: keep polling until the cooldown elapses, then auto-resolve
//! - Resume an unresolved event after restart (never re-submitted)
//! - At most one open event per node
//!
//! ## Failure semantics
//!
//! Errors inside a lifecycle task clear `unresolved` (fail open to Idle).
//! Cancellation leaves the persisted state alone so the flow resumes on
//! the next start.

pub mod types;

pub use types::*;

use crate::error::{Error, Result};
use crate::remote_client::{EventReport, NodeStatus, RemoteClient};
use crate::state_store::{AccidentEvent, EventStateStore, EventStatus};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a lifecycle task enters the state machine
enum Entry {
    /// Fresh detection with its compressed frame
    Report(Vec<u8>),
    /// Persisted unresolved event from a previous run
    Resume,
}

/// Drives one accident event at a time from report to resolution
pub struct EventLifecycleController {
    store: Arc<EventStateStore>,
    remote: Arc<dyn RemoteClient>,
    timings: LifecycleTimings,
    cancel: CancellationToken,
    /// Set while a lifecycle task is running
    active: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventLifecycleController {
    pub fn new(
        store: Arc<EventStateStore>,
        remote: Arc<dyn RemoteClient>,
        timings: LifecycleTimings,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            remote,
            timings,
            cancel,
            active: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// True while a report/monitor task is running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Confirmed detection. Starts report-and-monitor unless an event is
    /// already open. Returns whether a report was started.
    pub async fn handle_detection(self: &Arc<Self>, jpeg: Vec<u8>) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("Lifecycle task already running, detection ignored");
            return false;
        }

        if self.store.is_unresolved().await {
            self.active.store(false, Ordering::SeqCst);
            info!("Unresolved accident exists, skipping new report");
            return false;
        }

        self.spawn(Entry::Report(jpeg));
        true
    }

    /// Re-enter polling for a persisted unresolved event
    pub async fn resume(self: &Arc<Self>) -> bool {
        let Some(event) = self.store.snapshot().await.open_event().cloned() else {
            return false;
        };

        if self.active.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!(
            event_id = %event.event_id,
            status = %event.status,
            since = %event.last_transition_time,
            "Resuming unresolved accident"
        );
        self.spawn(Entry::Resume);
        true
    }

    /// Wait for the running lifecycle task, if any, up to `timeout`
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let handle = match self.task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match handle {
            Some(handle) => tokio::time::timeout(timeout, handle).await.is_ok(),
            None => true,
        }
    }

    // ========================================
    // Task boundary
    // ========================================

    fn spawn(self: &Arc<Self>, entry: Entry) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let flow = tokio::spawn(Arc::clone(&this).run_flow(entry));
            let outcome = match flow.await {
                Ok(result) => result,
                Err(e) => Err(Error::from(e)),
            };

            match outcome {
                Ok(()) => {}
                Err(Error::Cancelled) => {
                    info!("Lifecycle task cancelled, persisted state kept for resume");
                }
                Err(e) => {
                    error!(error = %e, "Lifecycle task failed, clearing unresolved flag");
                    if let Err(e) = this.store.clear_unresolved().await {
                        error!(error = %e, "Failed to clear unresolved flag");
                    }
                }
            }
            this.active.store(false, Ordering::SeqCst);
        });

        match self.task.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
    }

    async fn run_flow(self: Arc<Self>, entry: Entry) -> Result<()> {
        let event_id = match entry {
            Entry::Report(jpeg) => match self.report(&jpeg).await? {
                Some(event_id) => event_id,
                None => return Ok(()),
            },
            Entry::Resume => match self.store.snapshot().await.open_event() {
                Some(event) => event.event_id.clone(),
                None => return Ok(()),
            },
        };
        self.monitor(&event_id).await
    }

    // ========================================
    // Phases
    // ========================================

    /// Idle -> Reported. `None` when the backend did not accept the event.
    async fn report(&self, jpeg: &[u8]) -> Result<Option<String>> {
        let node = self
            .store
            .snapshot()
            .await
            .node
            .ok_or_else(|| Error::State("node is not registered".to_string()))?;

        let now = Utc::now();
        let report = EventReport::new(&node, jpeg, now);

        // Runs to completion on shutdown so an accepted event id is persisted;
        // bounded by the client timeout
        match self.remote.send_event(&report).await {
            Ok(event_id) => {
                self.store.record_reported(&event_id, now).await?;
                info!(event_id = %event_id, "Accident reported, monitoring status");
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                Ok(Some(event_id))
            }
            Err(e) => {
                error!(error = %e, "Failed to report accident");
                Ok(None)
            }
        }
    }

    /// Poll `event_id` through Reported and Validated until it closes
    async fn monitor(&self, event_id: &str) -> Result<()> {
        loop {
            let Some(event) = self.stored_event(event_id).await else {
                return Ok(());
            };

            let mut status = event.status;
            let mut since = event.last_transition_time;

            if status == EventStatus::Validated && self.remaining_cooldown(since).is_zero() {
                return self.auto_resolve(event_id).await;
            }

            let polled = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                polled = self.remote.poll_status(event_id) => polled,
            };

            match next_transition(status, polled) {
                Transition::Remain => {
                    debug!(event_id = %event_id, status = %status, polled = %polled, "No transition");
                }
                Transition::Validate => {
                    since = Utc::now();
                    self.store
                        .record_transition(event_id, EventStatus::Validated, since)
                        .await?;
                    status = EventStatus::Validated;
                    info!(
                        event_id = %event_id,
                        cooldown_secs = self.timings.cooldown.as_secs(),
                        "Accident validated, cooldown started"
                    );
                }
                Transition::Close(terminal) => {
                    return self.close(event_id, terminal).await;
                }
            }

            let wait = self.timings.next_wait(status, self.remaining_cooldown(since));
            self.sleep(wait).await?;
        }
    }

    /// Cooldown elapsed: tell the backend, then close locally
    async fn auto_resolve(&self, event_id: &str) -> Result<()> {
        info!(event_id = %event_id, "Cooldown elapsed, resolving accident");
        if let Err(e) = self
            .remote
            .update_event_status(event_id, EventStatus::Resolved)
            .await
        {
            warn!(event_id = %event_id, error = %e, "Failed to push resolved status");
        }
        self.close(event_id, EventStatus::Resolved).await
    }

    /// Terminal transition: persist, then put the node back online
    async fn close(&self, event_id: &str, status: EventStatus) -> Result<()> {
        self.store
            .record_transition(event_id, status, Utc::now())
            .await?;
        info!(event_id = %event_id, status = %status, "Accident closed");

        match self.store.node_id().await {
            Some(node_id) => {
                if let Err(e) = self.remote.set_node_status(&node_id, NodeStatus::Online).await {
                    warn!(node_id = %node_id, error = %e, "Failed to set node online");
                }
            }
            None => warn!("No node id, skipping node status update"),
        }
        Ok(())
    }

    // ========================================
    // Helpers
    // ========================================

    async fn stored_event(&self, event_id: &str) -> Option<AccidentEvent> {
        let state = self.store.snapshot().await;
        match state.open_event() {
            Some(event) if event.event_id == event_id => Some(event.clone()),
            _ => {
                info!(event_id = %event_id, "Event no longer open, monitoring stopped");
                None
            }
        }
    }

    fn remaining_cooldown(&self, since: DateTime<Utc>) -> Duration {
        let elapsed = (Utc::now() - since).to_std().unwrap_or(Duration::ZERO);
        self.timings.cooldown.saturating_sub(elapsed)
    }

    async fn sleep(&self, wait: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_client::fake::FakeRemote;
    use crate::state_store::NodeIdentity;
    use tempfile::TempDir;

    fn timings(check_ms: u64, cooldown_ms: u64) -> LifecycleTimings {
        LifecycleTimings {
            check_interval: Duration::from_millis(check_ms),
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }

    async fn registered_store(dir: &TempDir) -> Arc<EventStateStore> {
        let store = Arc::new(EventStateStore::open(dir.path().join("state.json")));
        store
            .set_node_identity(NodeIdentity {
                node_id: "node-1".to_string(),
                name: "junction".to_string(),
                latitude: 1.0,
                longitude: 2.0,
            })
            .await
            .unwrap();
        store
    }

    fn controller(
        store: &Arc<EventStateStore>,
        remote: &Arc<FakeRemote>,
        timings: LifecycleTimings,
        cancel: &CancellationToken,
    ) -> Arc<EventLifecycleController> {
        EventLifecycleController::new(
            Arc::clone(store),
            Arc::clone(remote) as Arc<dyn RemoteClient>,
            timings,
            cancel.clone(),
        )
    }

    #[tokio::test]
    async fn test_at_most_one_open_event() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let remote = Arc::new(FakeRemote::new(EventStatus::Reported));
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(20, 10_000), &cancel);

        assert!(ctl.handle_detection(vec![1]).await);
        assert!(!ctl.handle_detection(vec![2]).await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!ctl.handle_detection(vec![3]).await);
        assert_eq!(remote.sent(), 1);
        assert!(store.is_unresolved().await);

        cancel.cancel();
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_failed_report_stays_idle() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let remote = Arc::new(FakeRemote::new(EventStatus::Reported));
        remote.fail_send.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(20, 10_000), &cancel);

        assert!(ctl.handle_detection(vec![1]).await);
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);

        assert!(!ctl.is_active());
        assert!(!store.is_unresolved().await);
        assert!(store.snapshot().await.last_event.is_none());
        // no automatic retry
        assert_eq!(remote.sent(), 1);
    }

    #[tokio::test]
    async fn test_invalid_closes_and_sets_node_online() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let remote = Arc::new(
            FakeRemote::new(EventStatus::Reported)
                .script(&[EventStatus::Unknown, EventStatus::Reported, EventStatus::Invalid]),
        );
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(10, 10_000), &cancel);

        assert!(ctl.handle_detection(vec![1]).await);
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);

        let event = store.snapshot().await.last_event.unwrap();
        assert_eq!(event.event_id, "evt-1");
        assert_eq!(event.status, EventStatus::Invalid);
        assert!(!event.unresolved);
        assert_eq!(remote.polled(), 3);
        assert_eq!(
            remote.node_updates(),
            vec![("node-1".to_string(), NodeStatus::Online)]
        );
        // backend decided, nothing pushed back
        assert!(remote.event_updates().is_empty());

        // node is idle again
        assert!(ctl.handle_detection(vec![2]).await);
        cancel.cancel();
        ctl.wait_idle(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_validated_auto_resolves_after_cooldown() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let remote = Arc::new(FakeRemote::new(EventStatus::Validated));
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(30, 150), &cancel);

        let started = std::time::Instant::now();
        assert!(ctl.handle_detection(vec![1]).await);
        assert!(ctl.wait_idle(Duration::from_secs(3)).await);

        assert!(started.elapsed() >= Duration::from_millis(150));
        let event = store.snapshot().await.last_event.unwrap();
        assert_eq!(event.status, EventStatus::Resolved);
        assert!(!event.unresolved);
        assert_eq!(
            remote.event_updates(),
            vec![("evt-1".to_string(), EventStatus::Resolved)]
        );
        assert_eq!(remote.node_updates().len(), 1);
    }

    #[tokio::test]
    async fn test_resolved_during_cooldown_short_circuits() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let remote = Arc::new(
            FakeRemote::new(EventStatus::Validated)
                .script(&[EventStatus::Validated, EventStatus::Validated, EventStatus::Resolved]),
        );
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(10, 60_000), &cancel);

        assert!(ctl.handle_detection(vec![1]).await);
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);

        let event = store.snapshot().await.last_event.unwrap();
        assert_eq!(event.status, EventStatus::Resolved);
        assert!(remote.event_updates().is_empty());
    }

    #[tokio::test]
    async fn test_resume_uses_persisted_validation_time() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let validated_at = Utc::now() - chrono::Duration::seconds(3600);
        store.record_reported("evt-old", validated_at).await.unwrap();
        store
            .record_transition("evt-old", EventStatus::Validated, validated_at)
            .await
            .unwrap();

        let remote = Arc::new(FakeRemote::new(EventStatus::Validated));
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(10_000, 1_800_000), &cancel);

        assert!(ctl.resume().await);
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);

        // cooldown counted from the stored time: resolved without waiting
        assert_eq!(remote.sent(), 0);
        assert_eq!(remote.polled(), 0);
        let event = store.snapshot().await.last_event.unwrap();
        assert_eq!(event.event_id, "evt-old");
        assert_eq!(event.status, EventStatus::Resolved);
        assert!(!event.unresolved);
    }

    #[tokio::test]
    async fn test_resume_reported_polls_without_resubmitting() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        store.record_reported("evt-9", Utc::now()).await.unwrap();

        let remote = Arc::new(FakeRemote::new(EventStatus::Invalid));
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(10, 10_000), &cancel);

        assert!(ctl.resume().await);
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);

        assert_eq!(remote.sent(), 0);
        assert_eq!(
            store.snapshot().await.last_event.unwrap().status,
            EventStatus::Invalid
        );
    }

    #[tokio::test]
    async fn test_resume_without_open_event_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let remote = Arc::new(FakeRemote::new(EventStatus::Reported));
        let ctl = controller(&store, &remote, timings(10, 10), &CancellationToken::new());

        assert!(!ctl.resume().await);
        assert!(!ctl.is_active());
    }

    #[tokio::test]
    async fn test_cancellation_keeps_unresolved() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let remote = Arc::new(FakeRemote::new(EventStatus::Validated));
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(20, 60_000), &cancel);

        assert!(ctl.handle_detection(vec![1]).await);
        tokio::time::sleep(Duration::from_millis(80)).await;
        cancel.cancel();
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);

        let event = store.snapshot().await.last_event.unwrap();
        assert_eq!(event.status, EventStatus::Validated);
        assert!(event.unresolved);

        // a reopened store resumes the same event
        let reopened = EventStateStore::open(store.path());
        assert_eq!(reopened.snapshot().await.open_event().unwrap().event_id, "evt-1");
    }

    #[tokio::test]
    async fn test_shutdown_during_send_persists_event() {
        let dir = TempDir::new().unwrap();
        let store = registered_store(&dir).await;
        let remote = Arc::new(FakeRemote::new(EventStatus::Reported));
        *remote.send_delay.lock().unwrap() = Duration::from_millis(100);
        let cancel = CancellationToken::new();
        let ctl = controller(&store, &remote, timings(20, 60_000), &cancel);

        assert!(ctl.handle_detection(vec![1]).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);

        assert_eq!(remote.sent(), 1);
        assert_eq!(remote.polled(), 0);
        let reopened = EventStateStore::open(store.path());
        let event = reopened.snapshot().await.open_event().cloned().unwrap();
        assert_eq!(event.event_id, "evt-1");
        assert_eq!(event.status, EventStatus::Reported);
    }

    #[tokio::test]
    async fn test_unregistered_node_fails_open() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(EventStateStore::open(dir.path().join("state.json")));
        let remote = Arc::new(FakeRemote::new(EventStatus::Reported));
        let ctl = controller(&store, &remote, timings(10, 10), &CancellationToken::new());

        assert!(ctl.handle_detection(vec![1]).await);
        assert!(ctl.wait_idle(Duration::from_secs(2)).await);

        assert!(!ctl.is_active());
        assert!(!store.is_unresolved().await);
        assert_eq!(remote.sent(), 0);
    }
}
