//! DetectionConfirmer - Consecutive-hit confirmation
//!
//! Turns per-frame `(label, confidence)` predictions into a single
//! "confirmed accident" signal. Any non-qualifying frame resets the streak.

/// Label the classifier emits for an accident scene
pub const ACCIDENT_LABEL: &str = "accident";

/// Consecutive-frame accident confirmer
#[derive(Debug, Clone)]
pub struct DetectionConfirmer {
    threshold: f32,
    required_consecutive: u32,
    /// Current streak of qualifying frames
    streak: u32,
}

impl DetectionConfirmer {
    pub fn new(threshold: f32, required_consecutive: u32) -> Self {
        Self {
            threshold,
            required_consecutive: required_consecutive.max(1),
            streak: 0,
        }
    }

    /// Feed one processed frame's prediction. Returns true when a detection fires.
    pub fn observe(&mut self, label: &str, confidence: f32) -> bool {
        if label == ACCIDENT_LABEL && confidence >= self.threshold {
            self.streak += 1;
            tracing::info!(
                streak = self.streak,
                required = self.required_consecutive,
                confidence = confidence,
                "Potential accident detected"
            );
            if self.streak >= self.required_consecutive {
                self.streak = 0;
                tracing::warn!(
                    required = self.required_consecutive,
                    "Accident confirmed after consecutive detections"
                );
                return true;
            }
            false
        } else {
            self.streak = 0;
            false
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn reset(&mut self) {
        self.streak = 0;
    }
}
