//! Directory-backed frame source
//!
//! Plays the still images of a directory in file-name order. Reaching the
//! last image is end-of-stream; re-initializing rewinds. Files that fail to
//! decode are skipped so one bad image never pins the stream.

use super::{Frame, FrameSource};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct DirectoryFrameSource {
    dir: PathBuf,
    warmup_frames: u32,
    files: Vec<PathBuf>,
    cursor: usize,
    seq: u64,
    /// First index after warm-up
    start: usize,
    /// Frames decoded since the last `initialize`
    decoded: u64,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>, warmup_frames: u32) -> Self {
        Self {
            dir: dir.into(),
            warmup_frames,
            files: Vec::new(),
            cursor: 0,
            seq: 0,
            start: 0,
            decoded: 0,
        }
    }

    fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Camera(format!("Could not open frame source {}: {}", dir.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FrameSource for DirectoryFrameSource {
    fn initialize(&mut self) -> Result<()> {
        let files = Self::list_images(&self.dir)?;
        if files.is_empty() {
            return Err(Error::Camera(format!(
                "No images in frame source {}",
                self.dir.display()
            )));
        }

        self.files = files;
        self.cursor = 0;
        self.seq = 0;
        self.decoded = 0;
        self.start = 0;

        // warm-up never consumes the whole stream
        let warmup = (self.warmup_frames as usize).min(self.files.len() - 1);
        if warmup > 0 {
            info!(frames = warmup, "Warming up frame source");
            self.cursor = warmup;
            self.start = warmup;
        }

        info!(
            source = %self.dir.display(),
            images = self.files.len(),
            "Frame source initialized"
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.files.is_empty() {
            return Err(Error::Camera("Frame source not initialized".to_string()));
        }

        while let Some(path) = self.files.get(self.cursor) {
            self.cursor += 1;
            match image::open(path) {
                Ok(img) => {
                    self.seq += 1;
                    self.decoded += 1;
                    return Ok(Some(Frame::new(self.seq, img.to_rgb8())));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable frame");
                }
            }
        }

        if self.decoded == 0 && self.start > 0 {
            // everything after warm-up was unreadable; fall back to the skipped images
            self.start = 0;
            self.cursor = 0;
            return self.read_frame();
        }
        if self.decoded == 0 {
            return Err(Error::Camera(format!(
                "No decodable images in frame source {}",
                self.dir.display()
            )));
        }
        debug!("End of frame source");
        Ok(None)
    }

    fn release(&mut self) {
        if !self.files.is_empty() {
            info!(source = %self.dir.display(), "Closing frame source");
        }
        self.files.clear();
        self.cursor = 0;
    }
}
