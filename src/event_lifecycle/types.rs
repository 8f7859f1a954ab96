//! Lifecycle transition rules

use crate::state_store::EventStatus;
use std::time::Duration;

/// Outcome of applying a polled status to the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Keep polling in the current phase
    Remain,
    /// Reported -> Validated, starts the cooldown clock
    Validate,
    /// Invalid or Resolved; ends the event
    Close(EventStatus),
}

/// Decide the next step for an event stored as `current` when the backend
/// answered `polled`. Terminal events never move again.
pub fn next_transition(current: EventStatus, polled: EventStatus) -> Transition {
    if current.is_terminal() {
        return Transition::Remain;
    }

    match (current, polled) {
        (_, EventStatus::Invalid) | (_, EventStatus::Resolved) => Transition::Close(polled),
        (EventStatus::Validated, EventStatus::Validated) => Transition::Remain,
        (_, EventStatus::Validated) => Transition::Validate,
        _ => Transition::Remain,
    }
}

/// Polling cadence for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    pub check_interval: Duration,
    pub cooldown: Duration,
}

impl LifecycleTimings {
    /// Sleep before the next poll. During cooldown never past its end.
    pub fn next_wait(&self, status: EventStatus, remaining_cooldown: Duration) -> Duration {
        if status == EventStatus::Validated {
            self.check_interval.min(remaining_cooldown)
        } else {
            self.check_interval
        }
    }
}
