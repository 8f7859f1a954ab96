//! Classifier - Frame classification
//!
//! ## Responsibilities
//!
//! - `Classifier` contract: compressed frame -> (label, confidence)
//! - Default HTTP model-server client
//!
//! Model loading and availability belong to the implementation; the
//! inference worker only calls `health_check` once per start.

pub mod http;

pub use http::HttpClassifier;

use crate::error::Result;
use crate::image_processor::CompressedFrame;
use serde::Deserialize;

/// Label used when a prediction could not be made
pub const UNKNOWN_LABEL: &str = "unknown";

/// One prediction
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Stand-in for a failed prediction; never confirms anything
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_LABEL, 0.0)
    }
}

/// Synchronous classifier. Called from `spawn_blocking`.
pub trait Classifier: Send + Sync {
    /// Model ready to serve predictions
    fn health_check(&self) -> Result<()>;

    fn classify(&self, frame: &CompressedFrame) -> Result<Prediction>;
}
