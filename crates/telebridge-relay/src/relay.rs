use std::sync::Arc;

use serde_json::{json, Value};
use telebridge_link::LinkManager;
use telebridge_protocol::{
    AuditEntry, AuditLevel, AuditRecord, CommandRequest, CommandResult, COMMAND_WHITELIST,
};

use crate::error::{RelayError, Result};
use crate::trail::{AuditTrail, SOURCE_API};

/// Accepted command: the exact line written and its audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub line: String,
    pub row: Option<AuditRecord>,
}

/// Relays validated operator commands to the device.
///
/// Every attempt, accepted or not, produces one audit row and one `log`
/// broadcast.
#[derive(Debug, Clone)]
pub struct CommandRelay {
    link: Arc<LinkManager>,
    trail: AuditTrail,
}

impl CommandRelay {
    pub fn new(link: Arc<LinkManager>, trail: AuditTrail) -> Self {
        Self { link, trail }
    }

    /// Write a whitelisted command.
    ///
    /// `cmd.<type>` (202) on success; `cmd.tx.fail` (500) when the link is
    /// not ready or the write fails.
    pub fn send(&self, command: &CommandRequest) -> Result<Ack> {
        self.dispatch(command).0
    }

    /// Validate and relay a raw `{"type": ..., ...}` body.
    ///
    /// Never fails: the outcome is reported in the returned
    /// [`CommandResult`], shaped for the requesting client.
    pub fn submit(&self, body: &Value) -> CommandResult {
        let command = match CommandRequest::from_value(body) {
            Ok(command) => command,
            Err(err) => {
                let err = RelayError::InvalidCommand(err.to_string());
                tracing::info!(error = %err, "command rejected");
                let row = self.trail.record(
                    AuditEntry::new(AuditLevel::Warn, SOURCE_API, "cmd.invalid")
                        .with_payload(body.clone())
                        .with_status(422),
                );
                return CommandResult {
                    status: err.status_code(),
                    ok: false,
                    row,
                    message: Some("invalid command type".to_string()),
                    allow: Some(COMMAND_WHITELIST.iter().map(|s| s.to_string()).collect()),
                };
            }
        };

        match self.dispatch(&command) {
            (Ok(ack), _) => CommandResult {
                status: 202,
                ok: true,
                row: ack.row,
                message: None,
                allow: None,
            },
            (Err(err), row) => CommandResult {
                status: err.status_code(),
                ok: false,
                row,
                message: Some(err.to_string()),
                allow: None,
            },
        }
    }

    pub fn link(&self) -> &Arc<LinkManager> {
        &self.link
    }

    fn dispatch(&self, command: &CommandRequest) -> (Result<Ack>, Option<AuditRecord>) {
        let line = command.to_line();
        match self.link.write_line(&line) {
            Ok(_) => {
                tracing::info!(command = %command.kind(), "command relayed");
                let row = self.trail.record(
                    AuditEntry::new(AuditLevel::Info, SOURCE_API, format!("cmd.{}", command.kind()))
                        .with_payload(command.to_value())
                        .with_status(202),
                );
                (
                    Ok(Ack {
                        line,
                        row: row.clone(),
                    }),
                    row,
                )
            }
            Err(err) => {
                let err = RelayError::from(err);
                tracing::warn!(command = %command.kind(), error = %err, "command write failed");
                let row = self.trail.record(
                    AuditEntry::new(AuditLevel::Error, SOURCE_API, "cmd.tx.fail")
                        .with_payload(json!({
                            "error": err.to_string(),
                            "command": command.to_value(),
                        }))
                        .with_status(500),
                );
                (Err(err), row)
            }
        }
    }
}
