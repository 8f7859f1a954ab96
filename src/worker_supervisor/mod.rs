//! WorkerSupervisor - Worker table and restart policy
//!
//! ## Responsibilities
//!
//! - Start capture, inference, heartbeat and supervisor loops
//! - Restart any loop that exited while the system is still running
//! - Bounded join of every loop at shutdown
//!
//! A restarted loop runs the same entry point with fresh internal state.

use crate::workers::{self, WorkerContext};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Named long-running loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Capture,
    Inference,
    Heartbeat,
    Supervisor,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 4] = [
        WorkerKind::Capture,
        WorkerKind::Inference,
        WorkerKind::Heartbeat,
        WorkerKind::Supervisor,
    ];

    /// Loops watched by the supervisor loop
    pub const MONITORED: [WorkerKind; 3] = [
        WorkerKind::Capture,
        WorkerKind::Inference,
        WorkerKind::Heartbeat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Capture => "video_capture",
            Self::Inference => "frame_processing",
            Self::Heartbeat => "heartbeat",
            Self::Supervisor => "supervisor",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct WorkerSupervisor {
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
    check_interval: Duration,
    workers: Mutex<HashMap<WorkerKind, JoinHandle<()>>>,
    restarts: Mutex<HashMap<WorkerKind, u32>>,
}

impl WorkerSupervisor {
    pub fn new(
        ctx: Arc<WorkerContext>,
        cancel: CancellationToken,
        check_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            cancel,
            check_interval,
            workers: Mutex::new(HashMap::new()),
            restarts: Mutex::new(HashMap::new()),
        })
    }

    /// Start every loop
    pub fn start_all(self: &Arc<Self>) {
        for kind in WorkerKind::ALL {
            self.spawn(kind);
        }
        info!(workers = WorkerKind::ALL.len(), "Workers started");
    }

    /// Restart any loop in `kinds` that is missing or finished.
    /// Returns the restarted kinds. No-op once shutdown began.
    pub fn restart_dead(self: &Arc<Self>, kinds: &[WorkerKind]) -> Vec<WorkerKind> {
        if self.cancel.is_cancelled() {
            return Vec::new();
        }

        let dead: Vec<WorkerKind> = {
            let workers = lock(&self.workers);
            kinds
                .iter()
                .copied()
                .filter(|kind| workers.get(kind).map_or(true, |h| h.is_finished()))
                .collect()
        };

        for kind in &dead {
            let count = {
                let mut restarts = lock(&self.restarts);
                let count = restarts.entry(*kind).or_insert(0);
                *count += 1;
                *count
            };
            warn!(worker = %kind, restarts = count, "Worker died, restarting");
            self.spawn(*kind);
        }
        dead
    }

    pub fn is_running(&self, kind: WorkerKind) -> bool {
        lock(&self.workers)
            .get(&kind)
            .is_some_and(|h| !h.is_finished())
    }

    pub fn restart_count(&self, kind: WorkerKind) -> u32 {
        lock(&self.restarts).get(&kind).copied().unwrap_or(0)
    }

    /// Wait up to `grace` per loop. Loops that overrun are logged and aborted.
    pub async fn join_all(&self, grace: Duration) {
        let handles: Vec<(WorkerKind, JoinHandle<()>)> = lock(&self.workers).drain().collect();

        for (kind, mut handle) in handles {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => info!(worker = %kind, "Worker stopped"),
                Ok(Err(e)) => error!(worker = %kind, error = %e, "Worker panicked"),
                Err(_) => {
                    warn!(worker = %kind, grace_secs = grace.as_secs_f64(), "Worker did not stop in time");
                    handle.abort();
                }
            }
        }
    }

    fn spawn(self: &Arc<Self>, kind: WorkerKind) {
        let handle = match kind {
            WorkerKind::Supervisor => {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.supervise().await })
            }
            _ => {
                let ctx = Arc::clone(&self.ctx);
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    let result = match kind {
                        WorkerKind::Capture => workers::capture::run(ctx, cancel).await,
                        WorkerKind::Inference => workers::inference::run(ctx, cancel).await,
                        WorkerKind::Heartbeat => workers::heartbeat::run(ctx, cancel).await,
                        WorkerKind::Supervisor => Ok(()),
                    };
                    if let Err(e) = result {
                        error!(worker = %kind, error = %e, "Worker exited with error");
                    }
                })
            }
        };

        if let Some(old) = lock(&self.workers).insert(kind, handle) {
            if !old.is_finished() {
                old.abort();
            }
        }
    }

    async fn supervise(self: Arc<Self>) {
        info!(interval_secs = self.check_interval.as_secs_f64(), "Starting supervisor loop");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.check_interval) => {}
            }
            self.restart_dead(&WorkerKind::MONITORED);
        }
        info!("Supervisor loop stopped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
