use std::sync::Arc;

use telebridge_audit::AuditSink;
use telebridge_hub::Hub;
use telebridge_protocol::{AuditEntry, AuditRecord, BusMessage};

/// Audit source for rows describing the device and its link.
pub const SOURCE_SERIAL: &str = "serial";
/// Audit source for rows describing operator commands.
pub const SOURCE_API: &str = "api";

/// Appends audit rows and mirrors each one to the bus as a `log` message.
#[derive(Clone)]
pub struct AuditTrail {
    audit: Arc<dyn AuditSink>,
    hub: Arc<Hub>,
}

impl AuditTrail {
    pub fn new(audit: Arc<dyn AuditSink>, hub: Arc<Hub>) -> Self {
        Self { audit, hub }
    }

    /// Append and broadcast. A storage failure is logged and yields `None`;
    /// it never interrupts the caller.
    pub fn record(&self, entry: AuditEntry) -> Option<AuditRecord> {
        let action = entry.action.clone();
        match self.audit.append(entry) {
            Ok(row) => {
                self.hub.publish(&BusMessage::Log { row: row.clone() });
                Some(row)
            }
            Err(err) => {
                tracing::warn!(%action, error = %err, "audit append failed");
                None
            }
        }
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").field("hub", &self.hub).finish()
    }
}
