//! AccidentDetectionSystem - Composition root
//!
//! ## Responsibilities
//!
//! - Wire store, remote client, lifecycle controller and workers
//! - `start()`: registration (or reuse of the persisted node id), worker
//!   start, resumption of an unresolved event
//! - `run()`: block until shutdown, keep the supervisor loop alive, log uptime
//! - `shutdown()`: one broadcast cancel; safe to call from any thread, any
//!   number of times

use crate::capture::{DirectoryFrameSource, FrameSource, FrameSourceFactory};
use crate::classifier::{Classifier, HttpClassifier};
use crate::config::{AppConfig, Timings};
use crate::error::{Error, Result};
use crate::event_lifecycle::{EventLifecycleController, LifecycleTimings};
use crate::frame_pipeline::FrameQueue;
use crate::image_processor::{
    FrameCompressor, FrameDiffMotionGate, JpegCompressor, MotionGate, MotionGateFactory,
};
use crate::remote_client::{
    HttpRemoteClient, NodeRegistration, NodeStatus, RemoteClient, SimulatedRemoteClient,
};
use crate::state_store::{EventStateStore, NodeIdentity};
use crate::worker_supervisor::{WorkerKind, WorkerSupervisor};
use crate::workers::{WorkerContext, WorkerSettings};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const UPTIME_LOG_INTERVAL: Duration = Duration::from_secs(3600);

/// External collaborators behind their contracts
pub struct Collaborators {
    pub remote: Arc<dyn RemoteClient>,
    pub source_factory: FrameSourceFactory,
    pub motion_factory: MotionGateFactory,
    pub compressor: Arc<dyn FrameCompressor>,
    pub classifier: Arc<dyn Classifier>,
}

impl Collaborators {
    /// Default implementations. Debug mode swaps in the simulated backend.
    /// Must be called from within the tokio runtime.
    pub fn from_config(config: &AppConfig, debug: bool) -> Result<Self> {
        let remote: Arc<dyn RemoteClient> = if debug {
            info!("Debug mode: using simulated remote client");
            Arc::new(SimulatedRemoteClient::new())
        } else {
            Arc::new(HttpRemoteClient::new(&config.api)?)
        };

        let source_dir = config.camera.source.clone();
        let warmup = config.camera.warmup_frames;
        let source_factory: FrameSourceFactory = Arc::new(move || {
            Box::new(DirectoryFrameSource::new(source_dir.clone(), warmup)) as Box<dyn FrameSource>
        });

        let pixel_diff = config.performance.motion_pixel_diff_threshold;
        let motion_pixels = config.performance.motion_threshold_pixels;
        let motion_factory: MotionGateFactory = Arc::new(move || {
            Box::new(FrameDiffMotionGate::new(pixel_diff, motion_pixels)) as Box<dyn MotionGate>
        });

        let image = &config.image;
        let compressor = Arc::new(JpegCompressor::new(
            image.resize_width,
            image.resize_height,
            image.compression_quality,
        ));

        let classifier = Arc::new(HttpClassifier::new(
            &config.camera.classifier_url,
            Duration::from_secs(config.api.timeout_secs),
        )?);

        Ok(Self {
            remote,
            source_factory,
            motion_factory,
            compressor,
            classifier,
        })
    }
}

pub struct AccidentDetectionSystem {
    config: AppConfig,
    debug: bool,
    timings: Timings,
    cancel: CancellationToken,
    store: Arc<EventStateStore>,
    lifecycle: Arc<EventLifecycleController>,
    ctx: Arc<WorkerContext>,
    supervisor: Mutex<Option<Arc<WorkerSupervisor>>>,
    started_at: Instant,
}

impl AccidentDetectionSystem {
    pub fn new(config: AppConfig, debug: bool, collaborators: Collaborators) -> Self {
        let timings = config.timings(debug);
        let cancel = CancellationToken::new();
        let store = Arc::new(EventStateStore::open(&config.system.state_file));

        let lifecycle = EventLifecycleController::new(
            Arc::clone(&store),
            Arc::clone(&collaborators.remote),
            LifecycleTimings {
                check_interval: timings.reported_check_interval,
                cooldown: timings.accident_cooldown,
            },
            cancel.clone(),
        );

        let ctx = Arc::new(WorkerContext {
            store: Arc::clone(&store),
            remote: collaborators.remote,
            lifecycle: Arc::clone(&lifecycle),
            queue: Arc::new(FrameQueue::new(config.performance.frame_queue_size)),
            source_factory: collaborators.source_factory,
            motion_factory: collaborators.motion_factory,
            compressor: collaborators.compressor,
            classifier: collaborators.classifier,
            settings: WorkerSettings::from_config(&config, &timings, debug),
        });

        Self {
            config,
            debug,
            timings,
            cancel,
            store,
            lifecycle,
            ctx,
            supervisor: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<EventStateStore> {
        &self.store
    }

    pub fn lifecycle(&self) -> &Arc<EventLifecycleController> {
        &self.lifecycle
    }

    /// Token cancelled by `shutdown()`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register (or reuse identity), start workers, resume an open event
    pub async fn start(&self) -> Result<()> {
        info!(
            debug = self.debug,
            state_file = %self.store.path().display(),
            "Starting accident detection system"
        );

        self.ensure_registered().await?;

        let supervisor = WorkerSupervisor::new(
            Arc::clone(&self.ctx),
            self.cancel.clone(),
            self.timings.supervisor_interval,
        );
        supervisor.start_all();
        *lock(&self.supervisor) = Some(supervisor);

        if self.lifecycle.resume().await {
            info!("Unresolved accident found, monitoring resumed");
        }

        info!("System started successfully");
        Ok(())
    }

    /// Block until shutdown, then stop every loop within the grace period
    pub async fn run(&self) -> Result<()> {
        let supervisor = lock(&self.supervisor)
            .clone()
            .ok_or_else(|| Error::Internal("run() called before start()".to_string()))?;

        let mut uptime = tokio::time::interval(UPTIME_LOG_INTERVAL);
        uptime.tick().await;
        let mut watchdog = tokio::time::interval(self.timings.supervisor_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = watchdog.tick() => {
                    supervisor.restart_dead(&[WorkerKind::Supervisor]);
                }
                _ = uptime.tick() => {
                    let hours = self.started_at.elapsed().as_secs_f64() / 3600.0;
                    info!(uptime_hours = %format!("{:.1}", hours), "System uptime");
                }
            }
        }

        info!("Shutting down accident detection system");
        let grace = self.timings.shutdown_grace;
        supervisor.join_all(grace).await;
        // an in-flight event report is allowed its request timeout
        let report_grace = grace.max(Duration::from_secs(self.config.api.timeout_secs));
        if !self.lifecycle.wait_idle(report_grace).await {
            warn!("Lifecycle task did not stop in time");
        }
        info!("Shutdown complete");
        Ok(())
    }

    /// Broadcast cancellation. Idempotent.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Shutdown requested");
        }
        self.cancel.cancel();
    }

    async fn ensure_registered(&self) -> Result<()> {
        if let Some(node_id) = self.store.node_id().await {
            info!(node_id = %node_id, "Using persisted node id, skipping registration");
            return Ok(());
        }

        let node = &self.config.node;
        let registration = NodeRegistration {
            node_status: NodeStatus::Active,
            node_name: node.name.clone(),
            node_id: node.id.clone(),
            latitude: node.latitude,
            longitude: node.longitude,
        };

        let node_id = match self.ctx.remote.register_node(&registration).await {
            Ok(node_id) => node_id,
            Err(e) if self.debug => {
                warn!(error = %e, "Node registration failed, continuing in debug mode");
                if node.id.is_empty() {
                    "debug-node".to_string()
                } else {
                    node.id.clone()
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to register node");
                return Err(e);
            }
        };

        self.store
            .set_node_identity(NodeIdentity {
                node_id: node_id.clone(),
                name: node.name.clone(),
                latitude: node.latitude,
                longitude: node.longitude,
            })
            .await?;
        info!(node_id = %node_id, "Node identity persisted");
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
