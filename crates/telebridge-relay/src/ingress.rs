use std::sync::Arc;

use serde_json::Value;
use telebridge_hub::IngressHandler;
use telebridge_protocol::{BusMessage, ClientMessage};

use crate::relay::CommandRelay;

/// Routes command objects sent by bus subscribers through the relay.
///
/// Pings get no reply. Anything else gets a `command_result` addressed to
/// the sender only.
#[derive(Debug, Clone)]
pub struct CommandIngress {
    relay: Arc<CommandRelay>,
}

impl CommandIngress {
    pub fn new(relay: Arc<CommandRelay>) -> Self {
        Self { relay }
    }
}

impl IngressHandler for CommandIngress {
    fn handle(&self, text: &str) -> Option<String> {
        let result = match ClientMessage::parse(text) {
            ClientMessage::Ping => return None,
            ClientMessage::Command(body) => self.relay.submit(&body),
            ClientMessage::Unknown(raw) => self.relay.submit(&Value::String(raw)),
        };
        match BusMessage::CommandResult(result).to_json() {
            Ok(reply) => Some(reply),
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode command result");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use telebridge_audit::MemoryAuditSink;
    use telebridge_hub::Hub;
    use telebridge_link::{LinkManager, SerialConfig};

    use super::*;
    use crate::trail::AuditTrail;

    fn ingress() -> CommandIngress {
        let trail = AuditTrail::new(Arc::new(MemoryAuditSink::new()), Arc::new(Hub::default()));
        let link = Arc::new(LinkManager::new(SerialConfig::new("unix:/nonexistent", 115_200)));
        CommandIngress::new(Arc::new(CommandRelay::new(link, trail)))
    }

    #[test]
    fn ping_is_silent() {
        assert_eq!(ingress().handle("{\"type\":\"ping\"}"), None);
    }

    #[test]
    fn invalid_and_failed_commands_get_results() {
        let ingress = ingress();
        let reply: Value =
            serde_json::from_str(&ingress.handle("{\"type\":\"dance\"}").unwrap()).unwrap();
        assert_eq!(reply["type"], "command_result");
        assert_eq!(reply["status"], 422);
        assert_eq!(reply["allow"][4], "estop");

        let reply: Value = serde_json::from_str(&ingress.handle("not json").unwrap()).unwrap();
        assert_eq!(reply["status"], 422);

        let reply: Value =
            serde_json::from_str(&ingress.handle("{\"type\":\"estop\"}").unwrap()).unwrap();
        assert_eq!(reply["status"], 500);
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["row"]["action"], "cmd.tx.fail");
    }
}
