//! Capture - Frame acquisition
//!
//! ## Responsibilities
//!
//! - `FrameSource` contract used by the capture worker
//! - `Frame` payload shared between capture and inference
//! - Default directory-backed source
//!
//! Sources are synchronous; the capture worker drives them from
//! `spawn_blocking`.

pub mod directory;

pub use directory::DirectoryFrameSource;

use crate::error::Result;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;

/// One captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Per-source sequence number, starts at 1 after each initialize
    pub seq: u64,
    pub captured_at: DateTime<Utc>,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            captured_at: Utc::now(),
            image: Arc::new(image),
        }
    }
}

/// Raw frame acquisition
pub trait FrameSource: Send {
    /// Open (or reopen) the source and discard warm-up frames
    fn initialize(&mut self) -> Result<()>;

    /// Next frame. `Ok(None)` signals end-of-stream; the caller re-initializes.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    fn release(&mut self);
}

/// Builds a fresh source for each capture worker start
pub type FrameSourceFactory = Arc<dyn Fn() -> Box<dyn FrameSource> + Send + Sync>;
