//! Accident Detector Library
//!
//! Edge agent that screens a video source for accidents and reports them
//! to a remote authority, surviving restarts mid-adjudication.
//!
//! ## Architecture
//!
//! 1. StateStore - Durable node identity and current event (SSoT)
//! 2. FramePipeline - Bounded drop-oldest queue, capture -> inference
//! 3. DetectionConfirmer - Consecutive-hit confirmation
//! 4. EventLifecycleController - Report / poll / cooldown / resolve
//! 5. RemoteClient - Backend adapter with transport retry
//! 6. Workers - Capture, inference and heartbeat loops
//! 7. WorkerSupervisor - Restart dead loops, bounded shutdown
//! 8. System - Composition root (`start` / `run` / `shutdown`)
//!
//! Collaborators behind narrow contracts: `capture` (frame source),
//! `image_processor` (motion gate, compressor), `classifier`.
//!
//! ## Design Principles
//!
//! - SSoT: EventStateStore owns the only copy of persisted state
//! - Flush before commit: memory never runs ahead of disk
//! - One cancellation token, selectable from every wait

pub mod capture;
pub mod classifier;
pub mod config;
pub mod detection_confirmer;
pub mod error;
pub mod event_lifecycle;
pub mod frame_pipeline;
pub mod image_processor;
pub mod remote_client;
pub mod state_store;
pub mod system;
pub mod worker_supervisor;
pub mod workers;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use system::{AccidentDetectionSystem, Collaborators};
