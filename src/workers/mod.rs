//! Workers - Long-running loops
//!
//! ## Loops
//!
//! - `capture`: frame source -> motion gate -> frame queue
//! - `inference`: frame queue -> compressor -> classifier -> confirmer -> lifecycle
//! - `heartbeat`: periodic liveness ping
//!
//! Each loop is an `async fn run(ctx, cancel) -> Result<()>` that returns
//! `Ok` on cancellation and `Err` when it cannot continue. All per-run state
//! (source, motion reference, detection streak) is built inside `run`, so a
//! restart starts clean.

pub mod capture;
pub mod heartbeat;
pub mod inference;

use crate::capture::{Frame, FrameSourceFactory};
use crate::classifier::Classifier;
use crate::config::{AppConfig, Timings};
use crate::event_lifecycle::EventLifecycleController;
use crate::frame_pipeline::FrameQueue;
use crate::image_processor::{FrameCompressor, MotionGateFactory};
use crate::remote_client::RemoteClient;
use crate::state_store::EventStateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Loop cadence and detection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerSettings {
    pub capture_interval: Duration,
    /// Consult the motion gate on every Nth captured frame
    pub motion_check_every: u64,
    pub reinit_backoff: Duration,
    pub pop_timeout: Duration,
    pub min_processing_interval: Duration,
    pub compress_timeout: Duration,
    pub error_backoff: Duration,
    /// Inference idles in steps of this while an event is open
    pub open_event_pause: Duration,
    pub heartbeat_interval: Duration,
    pub confidence_threshold: f32,
    pub required_consecutive_frames: u32,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig, timings: &Timings, debug: bool) -> Self {
        Self {
            capture_interval: timings.frame_capture_interval,
            motion_check_every: config.performance.motion_check_every.max(1),
            reinit_backoff: Duration::from_secs(5),
            pop_timeout: Duration::from_secs(1),
            min_processing_interval: timings.min_processing_interval,
            compress_timeout: Duration::from_secs(2),
            error_backoff: Duration::from_millis(500),
            open_event_pause: if debug {
                Duration::from_secs(1)
            } else {
                Duration::from_secs(5)
            },
            heartbeat_interval: timings.heartbeat_interval,
            confidence_threshold: config.detection.accident_confidence_threshold,
            required_consecutive_frames: config.detection.required_consecutive_frames,
        }
    }
}

/// Everything the loops share. Built once by the system, cloned into each
/// worker start.
pub struct WorkerContext {
    pub store: Arc<EventStateStore>,
    pub remote: Arc<dyn RemoteClient>,
    pub lifecycle: Arc<EventLifecycleController>,
    pub queue: Arc<FrameQueue<Frame>>,
    pub source_factory: FrameSourceFactory,
    pub motion_factory: MotionGateFactory,
    pub compressor: Arc<dyn FrameCompressor>,
    pub classifier: Arc<dyn Classifier>,
    pub settings: WorkerSettings,
}

/// Sleep unless cancelled first. Returns false on cancellation.
pub(crate) async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
