use std::time::{Duration, SystemTime};

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Record delimiter on the wire.
pub const DELIMITER: u8 = b'\n';

/// Default maximum line length: 4 KiB.
pub const DEFAULT_MAX_LINE: usize = 4 * 1024;

/// A single text record as received from the device.
///
/// Line-ending bytes are stripped and surrounding whitespace trimmed; the
/// text is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    text: String,
    received_at: SystemTime,
}

impl RawRecord {
    /// Create a record stamped with the given arrival time.
    pub fn new(text: impl Into<String>, received_at: SystemTime) -> Self {
        Self {
            text: text.into(),
            received_at,
        }
    }

    /// The trimmed line text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the delimiter for this record was observed.
    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// Consume the record and return its text.
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Configuration for line readers and writers.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Maximum line length in bytes, excluding the delimiter. Default: 4 KiB.
    pub max_line_len: usize,
    /// Read timeout applied to the underlying device, when supported.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied to the underlying device, when supported.
    pub write_timeout: Option<Duration>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Incremental splitter from raw bytes to [`RawRecord`]s.
///
/// Feed bytes with [`extend`](Self::extend) and drain records with
/// [`next_line`](Self::next_line). Blank lines are dropped.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    max_line_len: usize,
    /// Set after an overflow; bytes are skipped up to the next delimiter.
    discarding: bool,
}

impl LineFramer {
    /// Create a framer with the given line length bound.
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_line_len.min(DEFAULT_MAX_LINE)),
            max_line_len,
            discarding: false,
        }
    }

    /// Append raw bytes from the device.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete, non-empty line.
    ///
    /// Returns `Ok(None)` when no complete line is buffered yet. An overflow
    /// is reported once; the following call resumes framing.
    pub fn next_line(&mut self) -> Result<Option<RawRecord>> {
        loop {
            let Some(pos) = self.buf.iter().position(|b| *b == DELIMITER) else {
                if self.buf.len() > self.max_line_len {
                    let size = self.buf.len();
                    self.buf.clear();
                    if self.discarding {
                        return Ok(None);
                    }
                    self.discarding = true;
                    return Err(FrameError::LineTooLong {
                        size,
                        max: self.max_line_len,
                    });
                }
                return Ok(None);
            };

            let line = self.buf.split_to(pos + 1);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if pos > self.max_line_len {
                return Err(FrameError::LineTooLong {
                    size: pos,
                    max: self.max_line_len,
                });
            }
            if let Some(text) = clean_line(&line[..pos]) {
                return Ok(Some(RawRecord::new(text, SystemTime::now())));
            }
        }
    }

    /// Number of buffered bytes that have not yet seen a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard any partial line. Returns the number of bytes dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        self.discarding = false;
        dropped
    }

    /// Configured line length bound.
    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

fn clean_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Encode an outbound line, appending `\n` if it is not already present.
///
/// A newline anywhere but the final byte would split the record on the wire
/// and is rejected.
pub fn encode_line(line: &str, dst: &mut BytesMut) -> Result<()> {
    let body = line.strip_suffix('\n').unwrap_or(line);
    if body.contains('\n') {
        return Err(FrameError::EmbeddedNewline);
    }
    dst.reserve(body.len() + 1);
    dst.put_slice(body.as_bytes());
    dst.put_u8(DELIMITER);
    Ok(())
}
