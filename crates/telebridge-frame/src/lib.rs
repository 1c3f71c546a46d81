//! Newline-delimited line framing for serial telemetry streams.
//!
//! The device speaks a line-oriented protocol: every record ends with `\n`.
//! This crate turns an arbitrary byte stream into trimmed text records and
//! encodes outbound lines with exactly one terminating newline.
//!
//! Partial lines are buffered until their delimiter arrives. The buffer is
//! bounded; an oversized line is reported once as [`FrameError::LineTooLong`]
//! and the framer resynchronises at the next delimiter.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::LineCodec;
pub use codec::{encode_line, LineConfig, LineFramer, RawRecord, DEFAULT_MAX_LINE, DELIMITER};
pub use error::{FrameError, Result};
pub use reader::{LineReader, Lines};
pub use writer::LineWriter;
