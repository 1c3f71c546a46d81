/// Errors raised by protocol validation and message encoding.
///
/// Decoding device lines never fails; see [`crate::Decoded::Unrecognized`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The command `type` is missing or not in the whitelist.
    #[error("invalid command type: {0}")]
    InvalidCommand(String),

    /// A line pattern failed to compile or lacks its capture group.
    #[error("invalid decode pattern: {0}")]
    Pattern(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
