//! `tokio_util::codec` adapter over [`LineFramer`].
//!
//! An oversized line does not end a `FramedRead` stream: the decoder drops
//! it with a warning, counts it in [`LineCodec::overflows`] and resumes at
//! the next delimiter. Only I/O errors terminate the stream.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_line, LineFramer, RawRecord, DEFAULT_MAX_LINE};
use crate::error::{FrameError, Result};

/// Line codec for `FramedRead` / `FramedWrite`.
#[derive(Debug)]
pub struct LineCodec {
    framer: LineFramer,
    overflows: u64,
}

impl LineCodec {
    /// Codec with the default line bound.
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    /// Codec with an explicit line bound.
    pub fn with_max_line(max_line_len: usize) -> Self {
        Self {
            framer: LineFramer::new(max_line_len),
            overflows: 0,
        }
    }

    /// Oversized lines dropped so far.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = RawRecord;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawRecord>> {
        if !src.is_empty() {
            let chunk = src.split();
            self.framer.extend(&chunk);
        }
        loop {
            match self.framer.next_line() {
                Err(FrameError::LineTooLong { size, max }) => {
                    self.overflows += 1;
                    tracing::warn!(size, max, "dropping oversized line");
                }
                other => return other,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawRecord>> {
        match self.decode(src)? {
            Some(record) => Ok(Some(record)),
            None => {
                let dropped = self.framer.finish();
                if dropped > 0 {
                    tracing::debug!(dropped, "discarding partial line at end of stream");
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<&str> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, line: &str, dst: &mut BytesMut) -> Result<()> {
        let body_len = line.strip_suffix('\n').unwrap_or(line).len();
        if body_len > self.framer.max_line_len() {
            return Err(FrameError::LineTooLong {
                size: body_len,
                max: self.framer.max_line_len(),
            });
        }
        encode_line(line, dst)
    }
}
