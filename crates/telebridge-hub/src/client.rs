use std::net::TcpStream;
use std::time::{Duration, Instant};

use serde::Serialize;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::{HubError, Result};

/// `ws://host:port/` for a bus endpoint.
pub fn bus_url(host: &str, port: u16) -> String {
    format!("ws://{host}:{port}/")
}

/// Blocking WebSocket client for the message bus.
pub struct BusClient {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
    url: String,
}

impl BusClient {
    pub fn connect(url: &str) -> Result<Self> {
        let (socket, _response) = tungstenite::connect(url)?;
        tracing::debug!(url, "connected to bus");
        Ok(Self {
            socket,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.socket.send(Message::Text(text.to_string()))?;
        Ok(())
    }

    pub fn send_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.send_text(&text)
    }

    /// Next text message, or `Ok(None)` if nothing arrives within `timeout`.
    ///
    /// Control frames are handled internally. Returns [`HubError::Closed`]
    /// when the server closes the connection.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.set_read_timeout(remaining)?;
            match self.socket.read() {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Binary(bytes)) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Close(_)) => return Err(HubError::Closed),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(tungstenite::Error::Io(err)) if is_timeout(&err) => return Ok(None),
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(HubError::Closed)
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Send a close frame and wait briefly for the server's reply.
    pub fn close(mut self) -> Result<()> {
        match self.socket.close(None) {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => {}
            Err(err) => return Err(err.into()),
        }
        let _ = self.set_read_timeout(Duration::from_millis(200));
        loop {
            match self.socket.read() {
                Ok(_) => continue,
                Err(_) => return Ok(()),
            }
        }
    }

    fn set_read_timeout(&self, timeout: Duration) -> Result<()> {
        if let MaybeTlsStream::Plain(stream) = self.socket.get_ref() {
            stream.set_read_timeout(Some(timeout))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for BusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusClient").field("url", &self.url).finish()
    }
}

pub(crate) fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
