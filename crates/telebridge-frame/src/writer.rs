use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_line, LineConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete newline-terminated lines to any `Write` stream.
///
/// Each call encodes the whole line into a scratch buffer first and then
/// writes it out in full, so a line is never left half-written by an
/// encoding error.
pub struct LineWriter<T> {
    inner: T,
    buf: BytesMut,
    config: LineConfig,
}

impl<T: Write> LineWriter<T> {
    /// Create a new line writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LineConfig::default())
    }

    /// Create a new line writer with explicit configuration.
    pub fn with_config(inner: T, config: LineConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send one line (blocking). Returns bytes written.
    ///
    /// A write timeout on the stream surfaces as [`FrameError::Io`] with
    /// `TimedOut` or `WouldBlock`; see [`FrameError::is_timeout`]. Part of
    /// the line may already be on the wire when that happens.
    pub fn send_line(&mut self, line: &str) -> Result<usize> {
        let body_len = line.strip_suffix('\n').unwrap_or(line).len();
        if body_len > self.config.max_line_len {
            return Err(FrameError::LineTooLong {
                size: body_len,
                max: self.config.max_line_len,
            });
        }

        self.buf.clear();
        encode_line(line, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        Ok(offset)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current line writer configuration.
    pub fn config(&self) -> &LineConfig {
        &self.config
    }
}
