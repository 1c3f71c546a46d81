use telebridge_link::{LinkObserver, LinkState};
use telebridge_protocol::{AuditEntry, AuditLevel, DeviceEvent};

use crate::trail::{AuditTrail, SOURCE_SERIAL};

/// Turns link transitions into audit rows and `log` broadcasts.
#[derive(Debug, Clone)]
pub struct AuditObserver {
    trail: AuditTrail,
}

impl AuditObserver {
    pub fn new(trail: AuditTrail) -> Self {
        Self { trail }
    }
}

impl LinkObserver for AuditObserver {
    fn on_transition(&self, _from: LinkState, to: LinkState, event: &DeviceEvent) {
        self.trail.record(transition_entry(to, event));
    }
}

pub(crate) fn transition_entry(to: LinkState, event: &DeviceEvent) -> AuditEntry {
    let entry = match to {
        LinkState::Opening => AuditEntry::new(AuditLevel::Info, SOURCE_SERIAL, "serial.opening"),
        LinkState::Ready => {
            AuditEntry::new(AuditLevel::Info, SOURCE_SERIAL, "serial.open").with_status(200)
        }
        LinkState::Faulted => {
            AuditEntry::new(AuditLevel::Error, SOURCE_SERIAL, "serial.error").with_status(500)
        }
        LinkState::Closed => {
            AuditEntry::new(AuditLevel::Warn, SOURCE_SERIAL, "serial.close").with_status(200)
        }
    };
    entry.with_payload(event.payload.clone())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use telebridge_protocol::EventKind;

    use super::*;

    #[test]
    fn transitions_map_to_serial_actions() {
        let open = DeviceEvent::new(EventKind::Event, json!({"path": "COM4", "baud": 115200}), 0);
        let entry = transition_entry(LinkState::Ready, &open);
        assert_eq!(entry.action, "serial.open");
        assert_eq!(entry.status_code, Some(200));
        assert_eq!(entry.payload, Some(json!({"path": "COM4", "baud": 115200})));

        let fault = DeviceEvent::new(EventKind::Error, json!({"error": "gone"}), 0);
        let entry = transition_entry(LinkState::Faulted, &fault);
        assert_eq!((entry.level, entry.status_code), (AuditLevel::Error, Some(500)));

        let close = DeviceEvent::new(EventKind::Event, json!({}), 0);
        let entry = transition_entry(LinkState::Closed, &close);
        assert_eq!((entry.level, entry.action.as_str()), (AuditLevel::Warn, "serial.close"));

        let entry = transition_entry(LinkState::Opening, &open);
        assert_eq!(entry.status_code, None);
    }
}
