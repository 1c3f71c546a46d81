use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{ProtocolError, Result};

/// Command types the device accepts, in wire spelling.
pub const COMMAND_WHITELIST: [&str; 5] = ["led", "set_speed", "direction", "lock", "estop"];

/// Whitelisted command type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Led,
    SetSpeed,
    Direction,
    Lock,
    Estop,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Led,
        CommandKind::SetSpeed,
        CommandKind::Direction,
        CommandKind::Lock,
        CommandKind::Estop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Led => "led",
            CommandKind::SetSpeed => "set_speed",
            CommandKind::Direction => "direction",
            CommandKind::Lock => "lock",
            CommandKind::Estop => "estop",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidCommand(s.to_string()))
    }
}

/// A validated operator command.
///
/// Holding a `CommandRequest` means the type already passed the whitelist.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    kind: CommandKind,
    fields: Map<String, Value>,
}

impl CommandRequest {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            fields: Map::new(),
        }
    }

    /// Add a field. A `type` key is ignored; the kind owns it.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "type" {
            self.fields.insert(key, value);
        }
        self
    }

    /// Validate a `{"type": ..., ...fields}` object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(ProtocolError::InvalidCommand("<not an object>".to_string()));
        };
        let kind = match object.get("type") {
            Some(Value::String(name)) => name.parse::<CommandKind>()?,
            Some(other) => return Err(ProtocolError::InvalidCommand(other.to_string())),
            None => return Err(ProtocolError::InvalidCommand("<missing>".to_string())),
        };
        let fields = object
            .iter()
            .filter(|(key, _)| key.as_str() != "type")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Self { kind, fields })
    }

    /// Parse and validate a JSON command line.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The command as a JSON object, `type` included.
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("type".to_string(), Value::String(self.kind.as_str().to_string()));
        Value::Object(object)
    }

    /// Single-line JSON encoding, without the trailing newline.
    pub fn to_line(&self) -> String {
        self.to_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn whitelist_matches_kinds() {
        let names: Vec<&str> = CommandKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, COMMAND_WHITELIST);
    }

    #[test]
    fn estop_is_accepted() {
        let cmd = CommandRequest::from_value(&json!({"type": "estop"})).unwrap();
        assert_eq!(cmd.kind(), CommandKind::Estop);
        assert!(cmd.fields().is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = CommandRequest::from_value(&json!({"type": "dance"})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidCommand(ref t) if t == "dance"));
    }

    #[test]
    fn missing_or_non_string_type_is_rejected() {
        assert!(CommandRequest::from_value(&json!({"speed": 3})).is_err());
        assert!(CommandRequest::from_value(&json!({"type": 1})).is_err());
        assert!(CommandRequest::from_value(&json!(["led"])).is_err());
    }

    #[test]
    fn fields_are_kept_and_line_is_single_json_object() {
        let cmd =
            CommandRequest::from_value(&json!({"type": "set_speed", "value": 120})).unwrap();
        assert_eq!(cmd.fields().get("value"), Some(&json!(120)));

        let line = cmd.to_line();
        assert!(!line.contains('\n'));
        let decoded: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, json!({"type": "set_speed", "value": 120}));
    }

    #[test]
    fn builder_cannot_override_type() {
        let cmd = CommandRequest::new(CommandKind::Led)
            .with_field("type", json!("dance"))
            .with_field("on", json!(true));
        assert_eq!(cmd.to_value(), json!({"type": "led", "on": true}));
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(matches!(
            CommandRequest::parse("{not json"),
            Err(ProtocolError::Json(_))
        ));
    }
}
