use std::io::{ErrorKind, Read};

use crate::codec::{LineConfig, LineFramer, RawRecord};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete text lines from any `Read` stream.
///
/// Handles partial reads internally; callers always get whole records.
pub struct LineReader<T> {
    inner: T,
    framer: LineFramer,
    config: LineConfig,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LineConfig::default())
    }

    /// Create a new line reader with explicit configuration.
    pub fn with_config(inner: T, config: LineConfig) -> Self {
        Self {
            inner,
            framer: LineFramer::new(config.max_line_len),
            config,
        }
    }

    /// Read the next non-empty line (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at end-of-file; any
    /// partial line still buffered is discarded. Timeouts from the
    /// underlying stream surface as `FrameError::Io` and leave buffered
    /// bytes intact, so the call can simply be retried.
    pub fn read_line(&mut self) -> Result<RawRecord> {
        loop {
            if let Some(record) = self.framer.next_line()? {
                return Ok(record);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                let dropped = self.framer.finish();
                if dropped > 0 {
                    tracing::debug!(dropped, "discarding partial line at end of stream");
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.framer.extend(&chunk[..read]);
        }
    }

    /// Lazy iterator over lines; ends at end-of-file.
    pub fn lines(&mut self) -> Lines<'_, T> {
        Lines {
            reader: self,
            done: false,
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

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current line reader configuration.
    pub fn config(&self) -> &LineConfig {
        &self.config
    }
}

/// Iterator returned by [`LineReader::lines`].
///
/// Yields `Err` items for overflow and I/O errors and keeps going; stops
/// after end-of-file.
pub struct Lines<'a, T> {
    reader: &'a mut LineReader<T>,
    done: bool,
}

impl<T: Read> Iterator for Lines<'_, T> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_line() {
            Err(FrameError::ConnectionClosed) => {
                self.done = true;
                None
            }
            other => Some(other),
        }
    }
}
