use telebridge_protocol::{AuditEntry, AuditRecord};

use crate::error::Result;

/// Rows returned by a query when the caller does not say.
pub const DEFAULT_QUERY_LIMIT: usize = 100;
/// Upper bound on rows returned by a single query.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Durable append-only record store.
///
/// Implementations must be safe to call from the reader pump and from any
/// number of command callers at once.
pub trait AuditSink: Send + Sync {
    /// Store one entry and return it as persisted, id and timestamp assigned.
    fn append(&self, entry: AuditEntry) -> Result<AuditRecord>;

    /// Most recent records first. `limit` is clamped with [`clamp_limit`].
    fn query(&self, limit: usize) -> Result<Vec<AuditRecord>>;
}

/// Clamp a requested row count into `1..=MAX_QUERY_LIMIT`.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_QUERY_LIMIT)
}
