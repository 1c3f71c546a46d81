use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::telemetry::now_millis;

/// Classification of a non-telemetry device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Ack,
    Event,
    Text,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Ack => "ack",
            EventKind::Event => "event",
            EventKind::Text => "text",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything from the device side that is not telemetry.
///
/// The payload is opaque to the bridge: the full structured record for
/// acks and events, a string for text, or a small object describing a
/// link transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEvent {
    pub kind: EventKind,
    pub payload: Value,
    #[serde(rename = "ts")]
    pub timestamp: i64,
}

impl DeviceEvent {
    /// Create an event stamped with an explicit time.
    pub fn new(kind: EventKind, payload: Value, timestamp: i64) -> Self {
        Self {
            kind,
            payload,
            timestamp,
        }
    }

    /// Create an event stamped with the current wall-clock time.
    pub fn now(kind: EventKind, payload: Value) -> Self {
        Self::new(kind, payload, now_millis())
    }
}
