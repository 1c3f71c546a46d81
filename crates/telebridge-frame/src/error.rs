/// Errors that can occur while framing or encoding lines.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A line exceeded the configured maximum length before its delimiter.
    #[error("line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An outbound line contained a newline before its end.
    #[error("outbound line contains an embedded newline")]
    EmbeddedNewline,

    /// An I/O error occurred while reading or writing lines.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached end-of-file.
    #[error("stream closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True when the error is a read/write timeout rather than a failure.
    ///
    /// Serial ports report an idle line as `TimedOut`; sockets with a read
    /// timeout report `WouldBlock`.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
