//! Persisted state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Accident event status as reported by (or sent to) the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Reported,
    Validated,
    Invalid,
    Resolved,
    Unknown,
}

impl EventStatus {
    /// Parse a backend status string; anything unrecognized is `Unknown`
    pub fn from_remote(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "reported" => Self::Reported,
            "validated" => Self::Validated,
            "invalid" => Self::Invalid,
            "resolved" => Self::Resolved,
            _ => Self::Unknown,
        }
    }

    /// Invalid and Resolved end an event's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Resolved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reported => "reported",
            Self::Validated => "validated",
            Self::Invalid => "invalid",
            Self::Resolved => "resolved",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node identity. `node_id` is backend-assigned on first registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One accident report cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccidentEvent {
    pub event_id: String,
    pub status: EventStatus,
    pub last_transition_time: DateTime<Utc>,
    /// True from reporting until a terminal disposition
    pub unresolved: bool,
}

/// Durable aggregate written to the state file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(default)]
    pub node: Option<NodeIdentity>,
    /// Current event, or the last one once it reached a terminal status
    #[serde(default)]
    pub last_event: Option<AccidentEvent>,
}

impl SystemState {
    pub fn node_id(&self) -> Option<&str> {
        self.node.as_ref().map(|n| n.node_id.as_str())
    }

    pub fn is_unresolved(&self) -> bool {
        self.last_event.as_ref().is_some_and(|e| e.unresolved)
    }

    /// The open event, if any
    pub fn open_event(&self) -> Option<&AccidentEvent> {
        self.last_event.as_ref().filter(|e| e.unresolved)
    }
}
