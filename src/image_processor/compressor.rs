//! Resize + JPEG compression

use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Output of one compression: the encoded report image and the resized
/// frame the classifier sees
#[derive(Debug, Clone)]
pub struct CompressedFrame {
    pub jpeg: Vec<u8>,
    pub resized: RgbImage,
}

pub trait FrameCompressor: Send + Sync {
    fn compress(&self, frame: &RgbImage) -> Result<CompressedFrame>;
}

#[derive(Debug, Clone, Copy)]
pub struct JpegCompressor {
    width: u32,
    height: u32,
    quality: u8,
}

impl JpegCompressor {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality: quality.clamp(1, 100),
        }
    }
}

impl FrameCompressor for JpegCompressor {
    fn compress(&self, frame: &RgbImage) -> Result<CompressedFrame> {
        let resized = imageops::resize(frame, self.width, self.height, FilterType::Triangle);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&resized)?;

        Ok(CompressedFrame { jpeg, resized })
    }
}
