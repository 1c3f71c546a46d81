use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

impl AuditLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditLevel::Info => "info",
            AuditLevel::Warn => "warn",
            AuditLevel::Error => "error",
        }
    }

    /// Parse the stored lowercase name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(AuditLevel::Info),
            "warn" => Some(AuditLevel::Warn),
            "error" => Some(AuditLevel::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit record before it is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub level: AuditLevel,
    pub source: String,
    pub action: String,
    pub payload: Option<Value>,
    pub status_code: Option<u16>,
}

impl AuditEntry {
    pub fn new(level: AuditLevel, source: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            action: action.into(),
            payload: None,
            status_code: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// A stored audit record as returned by the sink.
///
/// `payload` holds the JSON text of the entry payload, exactly as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub ts: String,
    pub level: AuditLevel,
    pub source: String,
    pub action: Option<String>,
    pub payload: Option<String>,
    pub status_code: Option<u16>,
}
