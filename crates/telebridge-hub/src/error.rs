use std::net::SocketAddr;

/// Errors raised by the hub, bus server, and bus client.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub or connection has been shut down.
    #[error("hub closed")]
    Closed,

    /// Failed to bind the bus listener.
    #[error("failed to bind bus on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept bus connection: {0}")]
    Accept(std::io::Error),

    /// WebSocket protocol or handshake failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// WebSocket handshake with a peer failed.
    #[error("websocket handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: String },

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error on the bus socket.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
