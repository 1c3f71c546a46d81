use std::sync::Mutex;

use telebridge_protocol::{AuditEntry, AuditRecord};

use crate::error::{AuditError, Result};
use crate::sink::{clamp_limit, AuditSink};
use crate::sqlite::{encode_payload, local_timestamp};

/// Audit sink that keeps every record in process memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records in append order.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: AuditEntry) -> Result<AuditRecord> {
        let mut records = self.records.lock().map_err(|_| AuditError::Poisoned)?;
        let record = AuditRecord {
            id: records.len() as i64 + 1,
            ts: local_timestamp(),
            level: entry.level,
            source: entry.source,
            action: Some(entry.action),
            payload: encode_payload(entry.payload.as_ref()),
            status_code: entry.status_code,
        };
        records.push(record.clone());
        Ok(record)
    }

    fn query(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let records = self.records.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(records
            .iter()
            .rev()
            .take(clamp_limit(limit))
            .cloned()
            .collect())
    }
}
