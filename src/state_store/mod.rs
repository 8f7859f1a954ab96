//! EventStateStore - Durable node/event record
//!
//! ## Responsibilities
//!
//! - Own the single `SystemState` instance (no ambient globals)
//! - Serialize every reader and writer through one async mutex
//! - Commit = atomic file replace; memory is updated only after the flush
//! - Unreadable or corrupt files are treated as a fresh start
//!
//! ## File protocol
//!
//! `<state>.tmp` is written, fsynced, then renamed over `<state>`. A crash
//! at any point leaves either the previous or the new file in place.

pub mod types;

pub use types::*;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Durable state boundary shared by registration, heartbeat and lifecycle
pub struct EventStateStore {
    path: PathBuf,
    state: Mutex<SystemState>,
}

impl EventStateStore {
    /// Open the store, loading any prior state from `path`
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state(&path);

        if let Some(event) = &state.last_event {
            tracing::info!(
                path = %path.display(),
                event_id = %event.event_id,
                status = %event.status,
                unresolved = event.unresolved,
                "Loaded persisted state"
            );
        }

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> SystemState {
        self.state.lock().await.clone()
    }

    pub async fn node_id(&self) -> Option<String> {
        self.state.lock().await.node_id().map(str::to_string)
    }

    pub async fn is_unresolved(&self) -> bool {
        self.state.lock().await.is_unresolved()
    }

    /// Apply `mutate` to a copy, flush it, then commit it in memory.
    ///
    /// The lock is held for the whole read-modify-flush so a concurrent
    /// reader never observes a state that is not on disk. If the flush
    /// fails the in-memory state is left untouched.
    pub async fn update<F>(&self, mutate: F) -> Result<SystemState>
    where
        F: FnOnce(&mut SystemState),
    {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        mutate(&mut next);

        if next == *guard {
            return Ok(next);
        }

        let bytes = serde_json::to_vec_pretty(&next)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await?
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to flush state file");
                Error::State(format!("Failed to flush state: {}", e))
            })?;

        *guard = next.clone();
        Ok(next)
    }

    /// Persist the registered node identity
    pub async fn set_node_identity(&self, identity: NodeIdentity) -> Result<()> {
        self.update(|state| state.node = Some(identity)).await?;
        Ok(())
    }

    /// Record a freshly reported event as the open event
    pub async fn record_reported(&self, event_id: &str, at: DateTime<Utc>) -> Result<()> {
        let event_id = event_id.to_string();
        self.update(|state| {
            state.last_event = Some(AccidentEvent {
                event_id,
                status: EventStatus::Reported,
                last_transition_time: at,
                unresolved: true,
            });
        })
        .await?;
        Ok(())
    }

    /// Move the event `event_id` to `status`. Terminal statuses clear `unresolved`.
    ///
    /// Returns `false` (no write) when the stored event is a different one.
    pub async fn record_transition(
        &self,
        event_id: &str,
        status: EventStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut matched = false;
        self.update(|state| {
            if let Some(event) = state.last_event.as_mut() {
                if event.event_id == event_id {
                    matched = true;
                    event.status = status;
                    event.last_transition_time = at;
                    if status.is_terminal() {
                        event.unresolved = false;
                    }
                }
            }
        })
        .await?;

        if !matched {
            tracing::warn!(
                event_id = %event_id,
                status = %status,
                "Transition for an event that is not the stored one, ignored"
            );
        }
        Ok(matched)
    }

    /// Fail-open: drop the unresolved flag so new detections can be reported
    pub async fn clear_unresolved(&self) -> Result<()> {
        self.update(|state| {
            if let Some(event) = state.last_event.as_mut() {
                event.unresolved = false;
            }
        })
        .await?;
        Ok(())
    }
}

fn load_state(path: &Path) -> SystemState {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No state file, starting fresh");
            return SystemState::default();
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "State file unreadable, starting fresh"
            );
            return SystemState::default();
        }
    };

    match serde_json::from_slice::<SystemState>(&bytes) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "State file corrupt, starting fresh"
            );
            SystemState::default()
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `bytes` to `path` so that readers see either the old or the new file
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;

    // Persist the rename itself
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn identity() -> NodeIdentity {
        NodeIdentity {
            node_id: "node-42".to_string(),
            name: "junction-12".to_string(),
            latitude: 24.7,
            longitude: 46.6,
        }
    }

    #[tokio::test]
    async fn test_fresh_start_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStateStore::open(dir.path().join("state.json"));
        assert_eq!(store.snapshot().await, SystemState::default());
        assert!(store.node_id().await.is_none());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let at = Utc::now();

        {
            let store = EventStateStore::open(&path);
            store.set_node_identity(identity()).await.unwrap();
            store.record_reported("evt-1", at).await.unwrap();
            store
                .record_transition("evt-1", EventStatus::Validated, at)
                .await
                .unwrap();
        }

        let store = EventStateStore::open(&path);
        let state = store.snapshot().await;
        assert_eq!(state.node_id(), Some("node-42"));
        let event = state.last_event.unwrap();
        assert_eq!(event.event_id, "evt-1");
        assert_eq!(event.status, EventStatus::Validated);
        assert_eq!(event.last_transition_time, at);
        assert!(event.unresolved);
    }

    #[tokio::test]
    async fn test_terminal_transition_clears_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStateStore::open(dir.path().join("state.json"));
        store.record_reported("evt-1", Utc::now()).await.unwrap();
        assert!(store.is_unresolved().await);

        store
            .record_transition("evt-1", EventStatus::Invalid, Utc::now())
            .await
            .unwrap();
        assert!(!store.is_unresolved().await);
        // Record kept as history
        let state = store.snapshot().await;
        assert_eq!(state.last_event.unwrap().status, EventStatus::Invalid);
    }

    #[tokio::test]
    async fn test_transition_for_other_event_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStateStore::open(dir.path().join("state.json"));
        store.record_reported("evt-1", Utc::now()).await.unwrap();

        let matched = store
            .record_transition("evt-2", EventStatus::Resolved, Utc::now())
            .await
            .unwrap();
        assert!(!matched);
        assert!(store.is_unresolved().await);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{\"node\": {\"node_id\": \"n").unwrap();

        let store = EventStateStore::open(&path);
        assert_eq!(store.snapshot().await, SystemState::default());

        // And the next write replaces the corrupt file
        store.record_reported("evt-9", Utc::now()).await.unwrap();
        let reopened = EventStateStore::open(&path);
        assert!(reopened.is_unresolved().await);
    }

    #[tokio::test]
    async fn test_crash_mid_write_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = EventStateStore::open(&path);
        store.set_node_identity(identity()).await.unwrap();
        store.record_reported("evt-1", Utc::now()).await.unwrap();
        let before = store.snapshot().await;

        // Writer killed halfway through the temp file of the next mutation
        let mut next = before.clone();
        if let Some(event) = next.last_event.as_mut() {
            event.status = EventStatus::Resolved;
            event.unresolved = false;
        }
        let full = serde_json::to_vec_pretty(&next).unwrap();
        std::fs::write(temp_path(&path), &full[..full.len() / 2]).unwrap();

        let reloaded = EventStateStore::open(&path).snapshot().await;
        assert_eq!(reloaded, before);
    }

    #[tokio::test]
    async fn test_crash_before_rename_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = EventStateStore::open(&path);
        store.record_reported("evt-1", Utc::now()).await.unwrap();
        let before = store.snapshot().await;

        // Temp file fully written but never renamed
        let mut next = before.clone();
        next.last_event = None;
        std::fs::write(temp_path(&path), serde_json::to_vec(&next).unwrap()).unwrap();

        let reloaded = EventStateStore::open(&path).snapshot().await;
        assert_eq!(reloaded, before);
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // Parent is a regular file, so every write fails
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = EventStateStore::open(blocker.join("state.json"));

        let result = store.record_reported("evt-1", Utc::now()).await;
        assert!(matches!(result, Err(Error::State(_))));
        assert!(!store.is_unresolved().await);
        assert!(store.snapshot().await.last_event.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_mix_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Arc::new(EventStateStore::open(&path));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("evt-{}", i);
                store.record_reported(&id, Utc::now()).await.unwrap();
                store
                    .record_transition(&id, EventStatus::Validated, Utc::now())
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let on_disk = EventStateStore::open(&path).snapshot().await;
        assert_eq!(on_disk, store.snapshot().await);
    }
}
