//! Frame-difference motion gate

use image::{imageops, GrayImage, RgbImage};

/// Weight of the newest frame when blending it into the reference
const REFERENCE_ALPHA: f32 = 0.75;

/// Gaussian sigma equivalent to a 5x5 kernel
const BLUR_SIGMA: f32 = 1.1;

/// Per-frame motion test. Implementations keep their own reference frame.
pub trait MotionGate: Send {
    fn has_motion(&mut self, frame: &RgbImage) -> bool;

    /// Forget the reference; the next frame primes it again
    fn reset(&mut self);
}

/// Grayscale + blur, count pixels that moved away from a running reference
pub struct FrameDiffMotionGate {
    pixel_diff_threshold: u8,
    motion_threshold_pixels: u32,
    reference: Option<GrayImage>,
}

impl FrameDiffMotionGate {
    pub fn new(pixel_diff_threshold: u8, motion_threshold_pixels: u32) -> Self {
        Self {
            pixel_diff_threshold,
            motion_threshold_pixels,
            reference: None,
        }
    }

    fn prepare(frame: &RgbImage) -> GrayImage {
        let gray = imageops::grayscale(frame);
        imageops::blur(&gray, BLUR_SIGMA)
    }

    fn changed_pixels(&self, reference: &GrayImage, current: &GrayImage) -> u32 {
        reference
            .as_raw()
            .iter()
            .zip(current.as_raw())
            .filter(|(r, c)| r.abs_diff(**c) > self.pixel_diff_threshold)
            .count() as u32
    }

    fn blend(reference: &mut GrayImage, current: &GrayImage) {
        for (r, c) in reference.iter_mut().zip(current.as_raw()) {
            let mixed = (1.0 - REFERENCE_ALPHA) * f32::from(*r) + REFERENCE_ALPHA * f32::from(*c);
            *r = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }
}

impl MotionGate for FrameDiffMotionGate {
    fn has_motion(&mut self, frame: &RgbImage) -> bool {
        let current = Self::prepare(frame);

        let mut reference = match self.reference.take() {
            Some(reference) if reference.dimensions() == current.dimensions() => reference,
            _ => {
                self.reference = Some(current);
                return false;
            }
        };

        let changed = self.changed_pixels(&reference, &current);
        Self::blend(&mut reference, &current);
        self.reference = Some(reference);

        let motion = changed > self.motion_threshold_pixels;
        tracing::trace!(changed_pixels = changed, motion = motion, "Motion check");
        motion
    }

    fn reset(&mut self) {
        self.reference = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(40, 40, Rgb([value, value, value]))
    }

    #[test]
    fn test_first_frame_primes_reference() {
        let mut gate = FrameDiffMotionGate::new(25, 500);
        assert!(!gate.has_motion(&solid(200)));
    }

    #[test]
    fn test_detects_large_change() {
        let mut gate = FrameDiffMotionGate::new(25, 500);
        gate.has_motion(&solid(0));
        assert!(gate.has_motion(&solid(200)));
    }

    #[test]
    fn test_static_scene_has_no_motion() {
        let mut gate = FrameDiffMotionGate::new(25, 500);
        gate.has_motion(&solid(90));
        assert!(!gate.has_motion(&solid(90)));
        assert!(!gate.has_motion(&solid(100)));
    }

    #[test]
    fn test_reference_follows_scene() {
        let mut gate = FrameDiffMotionGate::new(25, 500);
        gate.has_motion(&solid(0));
        assert!(gate.has_motion(&solid(200)));
        // reference is now 150; two more identical frames settle it
        gate.has_motion(&solid(200));
        assert!(!gate.has_motion(&solid(200)));
    }

    #[test]
    fn test_small_region_below_pixel_threshold() {
        let mut gate = FrameDiffMotionGate::new(25, 500);
        gate.has_motion(&solid(0));
        let mut frame = solid(0);
        for y in 0..5 {
            for x in 0..5 {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        assert!(!gate.has_motion(&frame));
    }

    #[test]
    fn test_resolution_change_reprimes() {
        let mut gate = FrameDiffMotionGate::new(25, 500);
        gate.has_motion(&solid(0));
        let other = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
        assert!(!gate.has_motion(&other));
    }

    #[test]
    fn test_changed_pixel_count() {
        let gate = FrameDiffMotionGate::new(10, 0);
        let a = GrayImage::from_raw(2, 2, vec![0, 0, 0, 0]).unwrap();
        let b = GrayImage::from_raw(2, 2, vec![0, 11, 10, 200]).unwrap();
        assert_eq!(gate.changed_pixels(&a, &b), 2);
    }
}
