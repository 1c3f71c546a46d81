use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde_json::Value;
use telebridge_protocol::{AuditEntry, AuditLevel, AuditRecord};

use crate::error::{AuditError, Result};
use crate::sink::{clamp_limit, AuditSink};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS robot_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts DATETIME NOT NULL,
    level TEXT CHECK(level IN ('info','warn','error')) NOT NULL,
    source TEXT,
    action TEXT,
    payload TEXT,
    status_code INTEGER
);
";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite-backed audit sink.
///
/// `rusqlite::Connection` is `!Sync`, so every call takes the mutex for the
/// duration of one statement.
pub struct SqliteAuditSink {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteAuditSink {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| AuditError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        tracing::info!(?path, "audit store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// A private in-memory database, discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Backing file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, entry: AuditEntry) -> Result<AuditRecord> {
        let conn = self.conn.lock().map_err(|_| AuditError::Poisoned)?;
        let ts = local_timestamp();
        let payload = encode_payload(entry.payload.as_ref());
        conn.execute(
            "INSERT INTO robot_logs (ts, level, source, action, payload, status_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ts,
                entry.level.as_str(),
                entry.source,
                entry.action,
                payload,
                entry.status_code
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::trace!(id, action = %entry.action, "audit row appended");
        Ok(AuditRecord {
            id,
            ts,
            level: entry.level,
            source: entry.source,
            action: Some(entry.action),
            payload,
            status_code: entry.status_code,
        })
    }

    fn query(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let conn = self.conn.lock().map_err(|_| AuditError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, ts, level, source, action, payload, status_code
             FROM robot_logs
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![clamp_limit(limit) as i64], row_to_record)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

impl std::fmt::Debug for SqliteAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAuditSink")
            .field("path", &self.path)
            .finish()
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<AuditRecord> {
    let level: String = row.get("level")?;
    let source: Option<String> = row.get("source")?;
    let status_code: Option<i64> = row.get("status_code")?;
    Ok(AuditRecord {
        id: row.get("id")?,
        ts: row.get("ts")?,
        // The CHECK constraint keeps unknown levels out; older rows fall back to info.
        level: AuditLevel::parse(&level).unwrap_or(AuditLevel::Info),
        source: source.unwrap_or_default(),
        action: row.get("action")?,
        payload: row.get("payload")?,
        status_code: status_code.and_then(|code| u16::try_from(code).ok()),
    })
}

/// Wall-clock local time in the stored `YYYY-MM-DD HH:MM:SS` form.
pub(crate) fn local_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Payloads are stored as JSON text; `null` is stored as SQL NULL.
pub(crate) fn encode_payload(payload: Option<&Value>) -> Option<String> {
    payload.filter(|value| !value.is_null()).map(Value::to_string)
}
