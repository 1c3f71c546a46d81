//! Audit trail for the bridge.
//!
//! The bridge only ever calls [`AuditSink::append`] and
//! [`AuditSink::query`]. [`SqliteAuditSink`] is the durable store used by
//! the `serve` command; [`MemoryAuditSink`] backs tests and `:memory:`
//! deployments without touching disk.

pub mod error;
pub mod memory;
pub mod sink;
pub mod sqlite;

pub use error::{AuditError, Result};
pub use memory::MemoryAuditSink;
pub use sink::{clamp_limit, AuditSink, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
pub use sqlite::SqliteAuditSink;
