use std::time::Duration;

use crate::state::LinkState;

/// Errors surfaced by the link manager.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A write was attempted while the link was not `Ready`.
    #[error("serial link not ready (state: {state})")]
    NotReady { state: LinkState },

    /// The device could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// A device-level failure moved the link to `Faulted`.
    #[error("serial link fault: {0}")]
    Fault(String),

    /// The device stopped accepting bytes within the write timeout. The
    /// link is `Faulted` because part of the line may have been sent.
    #[error("serial write timed out after {}ms", after.as_millis())]
    WriteTimeout { after: Duration },

    /// `open` was called while the link was already opening or ready.
    #[error("serial link already open (state: {state})")]
    AlreadyOpen { state: LinkState },

    /// I/O error outside of a line write.
    #[error("serial link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The outbound line itself was rejected by the framer.
    #[error("line rejected: {0}")]
    Frame(#[from] telebridge_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
