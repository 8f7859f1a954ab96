//! Configuration data types
//!
//! One struct per YAML section. Every section is `#[serde(default)]` so a
//! partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default values
pub mod defaults {
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;
    pub const STATE_FILE: &str = "state.json";
    pub const SUPERVISOR_INTERVAL_SECS: u64 = 5;
    pub const SHUTDOWN_GRACE_SECS: u64 = 3;

    pub const FRAME_QUEUE_SIZE: usize = 5;
    pub const FRAME_CAPTURE_INTERVAL_SECS: f64 = 0.1;
    pub const REPORTED_CHECK_INTERVAL_SECS: u64 = 60;
    pub const ACCIDENT_COOLDOWN_SECS: u64 = 1800;
    pub const MOTION_THRESHOLD_PIXELS: u32 = 500;
    pub const MOTION_PIXEL_DIFF_THRESHOLD: u8 = 25;
    pub const MOTION_CHECK_EVERY: u64 = 3;
    pub const MIN_PROCESSING_INTERVAL_MS: u64 = 200;

    pub const ACCIDENT_CONFIDENCE_THRESHOLD: f32 = 0.7;
    pub const REQUIRED_CONSECUTIVE_FRAMES: u32 = 2;

    pub const RESIZE_WIDTH: u32 = 224;
    pub const RESIZE_HEIGHT: u32 = 224;
    pub const COMPRESSION_QUALITY: u8 = 70;

    pub const API_BASE_URL: &str = "http://localhost:8000/prod/";
    pub const API_TIMEOUT_SECS: u64 = 10;
    pub const API_RETRY_ATTEMPTS: u32 = 3;
    pub const API_RETRY_BACKOFF_FACTOR: f64 = 0.3;

    pub const CAMERA_SOURCE: &str = "frames";
    pub const CAMERA_WARMUP_FRAMES: u32 = 5;
    pub const CLASSIFIER_URL: &str = "http://localhost:9000/predict";

    // Debug mode timings
    pub const DEBUG_FRAME_CAPTURE_INTERVAL_SECS: f64 = 0.05;
    pub const DEBUG_ACCIDENT_COOLDOWN_SECS: u64 = 10;
    pub const DEBUG_HEARTBEAT_INTERVAL_SECS: u64 = 100;
    pub const DEBUG_SUPERVISOR_INTERVAL_SECS: u64 = 1;
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub system: SystemConfig,
    pub performance: PerformanceConfig,
    pub detection: DetectionConfig,
    pub image: ImageConfig,
    pub api: ApiConfig,
    pub node: NodeConfig,
    pub camera: CameraConfig,
}

/// `system` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub debug_mode: bool,
    pub heartbeat_interval_secs: u64,
    pub state_file: PathBuf,
    /// How often the supervisor checks worker liveness
    pub supervisor_interval_secs: u64,
    /// Bounded wait per worker at shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            heartbeat_interval_secs: defaults::HEARTBEAT_INTERVAL_SECS,
            state_file: PathBuf::from(defaults::STATE_FILE),
            supervisor_interval_secs: defaults::SUPERVISOR_INTERVAL_SECS,
            shutdown_grace_secs: defaults::SHUTDOWN_GRACE_SECS,
        }
    }
}

/// `performance` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub frame_queue_size: usize,
    pub frame_capture_interval_secs: f64,
    pub reported_check_interval_secs: u64,
    pub accident_cooldown_secs: u64,
    pub motion_threshold_pixels: u32,
    pub motion_pixel_diff_threshold: u8,
    /// Run the motion gate on every Nth captured frame
    pub motion_check_every: u64,
    /// Frames popped sooner than this after the last processed one are skipped
    pub min_processing_interval_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            frame_queue_size: defaults::FRAME_QUEUE_SIZE,
            frame_capture_interval_secs: defaults::FRAME_CAPTURE_INTERVAL_SECS,
            reported_check_interval_secs: defaults::REPORTED_CHECK_INTERVAL_SECS,
            accident_cooldown_secs: defaults::ACCIDENT_COOLDOWN_SECS,
            motion_threshold_pixels: defaults::MOTION_THRESHOLD_PIXELS,
            motion_pixel_diff_threshold: defaults::MOTION_PIXEL_DIFF_THRESHOLD,
            motion_check_every: defaults::MOTION_CHECK_EVERY,
            min_processing_interval_ms: defaults::MIN_PROCESSING_INTERVAL_MS,
        }
    }
}

/// `detection` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub accident_confidence_threshold: f32,
    pub required_consecutive_frames: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            accident_confidence_threshold: defaults::ACCIDENT_CONFIDENCE_THRESHOLD,
            required_consecutive_frames: defaults::REQUIRED_CONSECUTIVE_FRAMES,
        }
    }
}

/// `image` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub resize_width: u32,
    pub resize_height: u32,
    pub compression_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            resize_width: defaults::RESIZE_WIDTH,
            resize_height: defaults::RESIZE_HEIGHT,
            compression_quality: defaults::COMPRESSION_QUALITY,
        }
    }
}

/// `api` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_factor: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            timeout_secs: defaults::API_TIMEOUT_SECS,
            retry_attempts: defaults::API_RETRY_ATTEMPTS,
            retry_backoff_factor: defaults::API_RETRY_BACKOFF_FACTOR,
        }
    }
}

/// `node` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub name: String,
    /// Pre-assigned node id; empty means "register on first start"
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// `camera` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Directory of still frames played back in name order
    pub source: PathBuf,
    pub warmup_frames: u32,
    /// Model server endpoint used by the HTTP classifier
    pub classifier_url: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from(defaults::CAMERA_SOURCE),
            warmup_frames: defaults::CAMERA_WARMUP_FRAMES,
            classifier_url: defaults::CLASSIFIER_URL.to_string(),
        }
    }
}

/// Effective loop timings after debug-mode adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub frame_capture_interval: Duration,
    pub reported_check_interval: Duration,
    pub accident_cooldown: Duration,
    pub heartbeat_interval: Duration,
    pub supervisor_interval: Duration,
    pub min_processing_interval: Duration,
    pub shutdown_grace: Duration,
}
