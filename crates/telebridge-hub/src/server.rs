use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tungstenite::{Message, WebSocket};

use crate::client::is_timeout;
use crate::error::{HubError, Result};
use crate::hub::{Hub, Subscription};

/// Default bus listen port.
pub const DEFAULT_BUS_PORT: u16 = 7071;

const ACCEPT_POLL: Duration = Duration::from_millis(25);
const CONNECTION_POLL: Duration = Duration::from_millis(20);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles text a subscriber sends up the bus.
///
/// The returned string, if any, is sent back to that subscriber only.
pub trait IngressHandler: Send + Sync {
    fn handle(&self, text: &str) -> Option<String>;
}

/// WebSocket front end for a [`Hub`].
pub struct BusServer {
    listener: TcpListener,
    hub: Arc<Hub>,
    ingress: Option<Arc<dyn IngressHandler>>,
    running: Arc<AtomicBool>,
}

impl BusServer {
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Display, hub: Arc<Hub>) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|source| HubError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        tracing::info!(addr = %listener.local_addr()?, "bus listening");
        Ok(Self {
            listener,
            hub,
            ingress: None,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn with_ingress(mut self, ingress: Arc<dyn IngressHandler>) -> Self {
        self.ingress = Some(ingress);
        self
    }

    /// Share an existing shutdown flag instead of the server's own.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> Result<BusServerHandle> {
        let addr = self.local_addr()?;
        let running = self.running_flag();
        let thread = thread::Builder::new()
            .name("telebridge-bus".to_string())
            .spawn(move || self.run())?;
        Ok(BusServerHandle {
            addr,
            running,
            thread: Some(thread),
        })
    }

    /// Accept connections until the running flag clears, then join every
    /// connection thread.
    pub fn run(self) {
        let mut connections: Vec<JoinHandle<()>> = Vec::new();
        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let hub = Arc::clone(&self.hub);
                    let ingress = self.ingress.clone();
                    let running = Arc::clone(&self.running);
                    let spawned = thread::Builder::new()
                        .name(format!("telebridge-bus-{peer}"))
                        .spawn(move || serve_connection(stream, peer, hub, ingress, running));
                    match spawned {
                        Ok(handle) => connections.push(handle),
                        Err(err) => tracing::warn!(%peer, error = %err, "failed to spawn connection thread"),
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(err) => {
                    tracing::warn!(error = %HubError::Accept(err), "bus accept failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
            connections.retain(|handle| !handle.is_finished());
        }

        tracing::debug!(connections = connections.len(), "bus stopping");
        for handle in connections {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for BusServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusServer")
            .field("addr", &self.listener.local_addr().ok())
            .finish()
    }
}

/// Handle to a spawned [`BusServer`].
#[derive(Debug)]
pub struct BusServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl BusServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, close every connection, and wait for the threads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for BusServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<Hub>,
    ingress: Option<Arc<dyn IngressHandler>>,
    running: Arc<AtomicBool>,
) {
    let mut socket = match accept_websocket(stream, peer) {
        Ok(socket) => socket,
        Err(err) => {
            tracing::debug!(%peer, error = %err, "bus handshake failed");
            return;
        }
    };

    let subscription = match hub.subscribe() {
        Ok(subscription) => subscription,
        Err(_) => {
            let _ = socket.close(None);
            let _ = socket.flush();
            return;
        }
    };
    let id = subscription.id();
    tracing::info!(%peer, %id, "bus subscriber connected");

    let outcome = pump_connection(&mut socket, &subscription, ingress.as_deref(), &running);
    match &outcome {
        Ok(()) => tracing::info!(%peer, %id, "bus subscriber disconnected"),
        Err(err) => tracing::debug!(%peer, %id, error = %err, "bus connection ended"),
    }

    hub.unsubscribe(id);
    if !matches!(outcome, Err(HubError::WebSocket(_))) {
        let _ = socket.close(None);
        let _ = socket.flush();
    }
}

fn accept_websocket(stream: TcpStream, peer: SocketAddr) -> Result<WebSocket<TcpStream>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let socket = tungstenite::accept(stream).map_err(|err| HubError::Handshake {
        peer,
        reason: err.to_string(),
    })?;
    socket.get_ref().set_read_timeout(Some(CONNECTION_POLL))?;
    Ok(socket)
}

// Alternates between draining the subscriber queue and a short read.
fn pump_connection(
    socket: &mut WebSocket<TcpStream>,
    subscription: &Subscription,
    ingress: Option<&dyn IngressHandler>,
    running: &AtomicBool,
) -> Result<()> {
    loop {
        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }

        loop {
            match subscription.try_recv() {
                Ok(Some(text)) => socket.send(Message::Text(text.to_string()))?,
                Ok(None) => break,
                Err(HubError::Closed) => return Ok(()),
                Err(err) => return Err(err),
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if let Some(reply) = ingress.and_then(|handler| handler.handle(&text)) {
                    socket.send(Message::Text(reply))?;
                }
            }
            Ok(Message::Close(_)) => {
                let _ = socket.flush();
                return Ok(());
            }
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                // Pong replies are queued by tungstenite; push them out.
                socket.flush()?;
            }
            Err(tungstenite::Error::Io(err)) if is_timeout(&err) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
    }
}
