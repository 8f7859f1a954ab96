//! ImageProcessor - Motion gate and frame compression
//!
//! ## Responsibilities
//!
//! - `MotionGate`: stateful per-frame motion test (running reference)
//! - `FrameCompressor`: resize + JPEG encode for classification and reports
//!
//! Both are synchronous and CPU-bound; workers call them from
//! `spawn_blocking`.

pub mod compressor;
pub mod motion;

pub use compressor::{CompressedFrame, FrameCompressor, JpegCompressor};
pub use motion::{FrameDiffMotionGate, MotionGate};

/// Builds a fresh motion gate for each capture worker start
pub type MotionGateFactory = std::sync::Arc<dyn Fn() -> Box<dyn MotionGate> + Send + Sync>;
