use serde::Serialize;
use serde_json::Value;

use crate::audit::AuditRecord;
use crate::error::Result;
use crate::telemetry::TelemetrySample;

/// Messages fanned out to bus subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    /// `{"type":"telemetry","data":{...}}`
    Telemetry { data: TelemetrySample },
    /// `{"type":"log","row":{...}}`
    Log { row: AuditRecord },
    /// Reply to a command submitted by one subscriber; never broadcast.
    CommandResult(CommandResult),
}

impl BusMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outcome of a relayed command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub status: u16,
    pub ok: bool,
    pub row: Option<AuditRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
}

/// Messages a subscriber may send to the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Heartbeat; no reply.
    Ping,
    /// Any other JSON object, treated as command ingress.
    Command(Value),
    /// Not a JSON object.
    Unknown(String),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) if value.is_object() => {
                if value.get("type").and_then(Value::as_str) == Some("ping") {
                    ClientMessage::Ping
                } else {
                    ClientMessage::Command(value)
                }
            }
            _ => ClientMessage::Unknown(text.to_string()),
        }
    }
}
