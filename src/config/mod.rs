//! Configuration - YAML file + environment overrides
//!
//! ## Responsibilities
//!
//! - Load `config.yaml` (missing file = defaults)
//! - Overlay `NODE_*` / `API_BASE_URL` environment variables
//! - Validate numeric ranges
//! - Derive effective loop timings (debug mode shortens them)

pub mod types;

pub use types::*;

use crate::error::{Error, Result};
use std::path::Path;
use std::time::Duration;

/// Environment variable -> node/api field mapping
const ENV_NODE_NAME: &str = "NODE_NAME";
const ENV_NODE_ID: &str = "NODE_ID";
const ENV_NODE_LATITUDE: &str = "NODE_LATITUDE";
const ENV_NODE_LONGITUDE: &str = "NODE_LONGITUDE";
const ENV_API_BASE_URL: &str = "API_BASE_URL";

impl AppConfig {
    /// Load configuration from `path`, then apply process environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse the YAML file; a missing file yields defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Overlay environment values. `lookup` abstracts `std::env::var` for tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(ENV_NODE_NAME) {
            self.node.name = name;
        }
        if let Some(id) = lookup(ENV_NODE_ID) {
            self.node.id = id;
        }
        if let Some(lat) = lookup(ENV_NODE_LATITUDE) {
            self.node.latitude = parse_float(ENV_NODE_LATITUDE, &lat)?;
        }
        if let Some(lon) = lookup(ENV_NODE_LONGITUDE) {
            self.node.longitude = parse_float(ENV_NODE_LONGITUDE, &lon)?;
        }
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api.base_url = url;
        }
        Ok(())
    }

    /// Ensure numeric configuration values meet expected constraints
    pub fn validate(&self) -> Result<()> {
        let perf = &self.performance;
        if perf.frame_queue_size < 1 {
            return Err(Error::Config("performance.frame_queue_size must be >= 1".to_string()));
        }
        if !(perf.frame_capture_interval_secs.is_finite() && perf.frame_capture_interval_secs > 0.0)
        {
            return Err(Error::Config(
                "performance.frame_capture_interval_secs must be a finite value > 0".to_string(),
            ));
        }
        if perf.reported_check_interval_secs == 0 {
            return Err(Error::Config(
                "performance.reported_check_interval_secs must be > 0".to_string(),
            ));
        }
        if perf.motion_check_every == 0 {
            return Err(Error::Config("performance.motion_check_every must be >= 1".to_string()));
        }

        let det = &self.detection;
        if !(0.0..=1.0).contains(&det.accident_confidence_threshold) {
            return Err(Error::Config(
                "detection.accident_confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
        if det.required_consecutive_frames < 1 {
            return Err(Error::Config(
                "detection.required_consecutive_frames must be >= 1".to_string(),
            ));
        }

        if self.image.resize_width == 0 || self.image.resize_height == 0 {
            return Err(Error::Config("image resize dimensions must be > 0".to_string()));
        }
        if !(1..=100).contains(&self.image.compression_quality) {
            return Err(Error::Config("image.compression_quality must be within [1, 100]".to_string()));
        }

        if self.system.heartbeat_interval_secs == 0 || self.system.supervisor_interval_secs == 0 {
            return Err(Error::Config("system intervals must be > 0".to_string()));
        }
        if self.api.base_url.is_empty() {
            return Err(Error::Config("api.base_url must not be empty".to_string()));
        }
        if !(self.api.retry_backoff_factor.is_finite() && self.api.retry_backoff_factor >= 0.0) {
            return Err(Error::Config(
                "api.retry_backoff_factor must be a finite value >= 0".to_string(),
            ));
        }

        // Coordinates are persisted in the state file; NaN would serialize as null
        if !(self.node.latitude.is_finite() && (-90.0..=90.0).contains(&self.node.latitude)) {
            return Err(Error::Config("node.latitude must be within [-90, 90]".to_string()));
        }
        if !(self.node.longitude.is_finite() && (-180.0..=180.0).contains(&self.node.longitude)) {
            return Err(Error::Config("node.longitude must be within [-180, 180]".to_string()));
        }

        Ok(())
    }

    /// Effective timings. Debug mode shortens capture, cooldown and supervision.
    pub fn timings(&self, debug: bool) -> Timings {
        let perf = &self.performance;
        let sys = &self.system;

        if debug {
            Timings {
                frame_capture_interval: Duration::from_secs_f64(
                    defaults::DEBUG_FRAME_CAPTURE_INTERVAL_SECS,
                ),
                reported_check_interval: Duration::from_secs(perf.reported_check_interval_secs),
                accident_cooldown: Duration::from_secs(defaults::DEBUG_ACCIDENT_COOLDOWN_SECS),
                heartbeat_interval: Duration::from_secs(defaults::DEBUG_HEARTBEAT_INTERVAL_SECS),
                supervisor_interval: Duration::from_secs(defaults::DEBUG_SUPERVISOR_INTERVAL_SECS),
                min_processing_interval: Duration::from_millis(perf.min_processing_interval_ms),
                shutdown_grace: Duration::from_secs(sys.shutdown_grace_secs),
            }
        } else {
            Timings {
                frame_capture_interval: Duration::from_secs_f64(perf.frame_capture_interval_secs),
                reported_check_interval: Duration::from_secs(perf.reported_check_interval_secs),
                accident_cooldown: Duration::from_secs(perf.accident_cooldown_secs),
                heartbeat_interval: Duration::from_secs(sys.heartbeat_interval_secs),
                supervisor_interval: Duration::from_secs(sys.supervisor_interval_secs),
                min_processing_interval: Duration::from_millis(perf.min_processing_interval_ms),
                shutdown_grace: Duration::from_secs(sys.shutdown_grace_secs),
            }
        }
    }
}

fn parse_float(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("Invalid float for {}: '{}'", key, value)))
}
