use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use telebridge_frame::{FrameError, LineConfig, LineReader, LineWriter};
use telebridge_protocol::{DeviceEvent, EventKind};

use crate::error::{LinkError, Result};
use crate::opener::{DeviceOpener, SerialConfig, SystemOpener};
use crate::state::LinkState;
use crate::stream::LinkStream;

/// Receives every link state transition.
///
/// Called while the link lock is held, so transitions are reported in the
/// order they happen. Implementations must not call back into the
/// [`LinkManager`].
pub trait LinkObserver: Send + Sync {
    fn on_transition(&self, from: LinkState, to: LinkState, event: &DeviceEvent);
}

/// Read half of an open link.
///
/// `generation` identifies the open call that produced it; reports from a
/// stale session are ignored after the link has been reopened.
pub struct LinkSession {
    pub reader: LineReader<LinkStream>,
    pub generation: u64,
}

struct LinkInner {
    state: LinkState,
    writer: Option<LineWriter<LinkStream>>,
    generation: u64,
}

/// Sole owner of the device handle.
pub struct LinkManager {
    config: SerialConfig,
    opener: Box<dyn DeviceOpener>,
    observer: Option<Arc<dyn LinkObserver>>,
    inner: Mutex<LinkInner>,
}

impl LinkManager {
    /// A closed link using the system opener.
    pub fn new(config: SerialConfig) -> Self {
        Self::with_opener(config, SystemOpener)
    }

    pub fn with_opener(config: SerialConfig, opener: impl DeviceOpener + 'static) -> Self {
        Self {
            config,
            opener: Box::new(opener),
            observer: None,
            inner: Mutex::new(LinkInner {
                state: LinkState::Closed,
                writer: None,
                generation: 0,
            }),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LinkObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    /// Open the device: `Closed|Faulted -> Opening -> Ready`.
    ///
    /// The lock is released while the device is being opened, so `state`
    /// and `write_line` answer immediately with `Opening`. On failure the
    /// link ends in `Faulted`. If the link was closed or faulted while
    /// opening, the new handle is dropped and `NotReady` is returned.
    pub fn open(&self) -> Result<LinkSession> {
        let generation = {
            let mut inner = self.lock();
            if !inner.state.can_open() {
                return Err(LinkError::AlreadyOpen { state: inner.state });
            }
            inner.generation += 1;
            self.transition(
                &mut inner,
                LinkState::Opening,
                DeviceEvent::now(EventKind::Event, self.endpoint_payload()),
            );
            inner.generation
        };

        let connected = self.connect();

        let mut inner = self.lock();
        if inner.generation != generation || inner.state != LinkState::Opening {
            tracing::info!(path = %self.config.path, state = %inner.state, "open superseded");
            if let Ok((_, writer)) = connected {
                if let Err(err) = writer.get_ref().shutdown() {
                    tracing::debug!(error = %err, "device shutdown failed");
                }
            }
            return Err(LinkError::NotReady { state: inner.state });
        }

        match connected {
            Ok((reader, writer)) => {
                inner.writer = Some(writer);
                tracing::info!(path = %self.config.path, baud = self.config.baud, "serial link open");
                self.transition(
                    &mut inner,
                    LinkState::Ready,
                    DeviceEvent::now(EventKind::Event, self.endpoint_payload()),
                );
                Ok(LinkSession { reader, generation })
            }
            Err(source) => {
                tracing::warn!(path = %self.config.path, error = %source, "serial link open failed");
                self.transition(
                    &mut inner,
                    LinkState::Faulted,
                    error_event(&source.to_string()),
                );
                Err(LinkError::Open {
                    path: self.config.path.clone(),
                    source,
                })
            }
        }
    }

    /// Write one line. Holds the link lock for the whole line.
    ///
    /// Fails with [`LinkError::NotReady`] unless the link is `Ready`. A
    /// device error faults the link and returns [`LinkError::Fault`]; a
    /// device that stops draining faults it with [`LinkError::WriteTimeout`]
    /// once the configured write timeout elapses.
    pub fn write_line(&self, line: &str) -> Result<usize> {
        let mut inner = self.lock();
        if !inner.state.is_ready() {
            return Err(LinkError::NotReady { state: inner.state });
        }
        let Some(writer) = inner.writer.as_mut() else {
            return Err(LinkError::NotReady { state: inner.state });
        };

        match writer.send_line(line) {
            Ok(written) => {
                tracing::debug!(bytes = written, "line written to device");
                Ok(written)
            }
            Err(err @ (FrameError::LineTooLong { .. } | FrameError::EmbeddedNewline)) => {
                Err(LinkError::Frame(err))
            }
            Err(err) if err.is_timeout() => {
                let after = self.config.write_timeout;
                let reason = format!("write timed out after {}ms", after.as_millis());
                self.fault_locked(&mut inner, &reason);
                Err(LinkError::WriteTimeout { after })
            }
            Err(err) => {
                let reason = err.to_string();
                self.fault_locked(&mut inner, &reason);
                Err(LinkError::Fault(reason))
            }
        }
    }

    /// Report a device error: `Opening|Ready -> Faulted`.
    ///
    /// Returns `false` when the link was not live.
    pub fn fault(&self, reason: &str) -> bool {
        let mut inner = self.lock();
        self.fault_locked(&mut inner, reason)
    }

    /// Close the device from any state. Emits a transition only if the link
    /// was not already closed.
    pub fn close(&self) -> bool {
        let mut inner = self.lock();
        self.close_locked(&mut inner)
    }

    /// Fault reported by the reader of `generation`; ignored if stale.
    pub fn session_fault(&self, generation: u64, reason: &str) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        self.fault_locked(&mut inner, reason)
    }

    /// End-of-stream reported by the reader of `generation`; ignored if
    /// stale or already faulted.
    pub fn session_closed(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation || inner.state == LinkState::Faulted {
            return false;
        }
        self.close_locked(&mut inner)
    }

    /// Whether `generation` is still the live session.
    pub fn is_current(&self, generation: u64) -> bool {
        let inner = self.lock();
        inner.generation == generation && inner.state.is_ready()
    }

    fn connect(&self) -> std::io::Result<(LineReader<LinkStream>, LineWriter<LinkStream>)> {
        let mut stream = self.opener.open(&self.config)?;
        stream.set_write_timeout(self.config.write_timeout)?;
        let mut read_half = stream.try_clone()?;
        read_half.set_read_timeout(self.config.read_timeout)?;

        let line_config = LineConfig {
            max_line_len: self.config.max_line_len,
            read_timeout: Some(self.config.read_timeout),
            write_timeout: Some(self.config.write_timeout),
        };
        Ok((
            LineReader::with_config(read_half, line_config.clone()),
            LineWriter::with_config(stream, line_config),
        ))
    }

    fn fault_locked(&self, inner: &mut LinkInner, reason: &str) -> bool {
        if !matches!(inner.state, LinkState::Opening | LinkState::Ready) {
            return false;
        }
        tracing::warn!(path = %self.config.path, reason, "serial link fault");
        release(inner);
        self.transition(inner, LinkState::Faulted, error_event(reason));
        true
    }

    fn close_locked(&self, inner: &mut LinkInner) -> bool {
        release(inner);
        if inner.state == LinkState::Closed {
            return false;
        }
        tracing::info!(path = %self.config.path, "serial link closed");
        self.transition(
            inner,
            LinkState::Closed,
            DeviceEvent::now(EventKind::Event, json!({})),
        );
        true
    }

    fn transition(&self, inner: &mut LinkInner, to: LinkState, event: DeviceEvent) {
        let from = inner.state;
        inner.state = to;
        tracing::debug!(%from, %to, "link transition");
        if let Some(observer) = &self.observer {
            observer.on_transition(from, to, &event);
        }
    }

    fn endpoint_payload(&self) -> serde_json::Value {
        json!({ "path": self.config.path, "baud": self.config.baud })
    }

    // A panic while holding the lock leaves either a whole state assignment
    // or a finished line write behind, so the data is still coherent.
    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        release(inner);
    }
}

impl std::fmt::Debug for LinkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkManager")
            .field("path", &self.config.path)
            .field("state", &self.state())
            .finish()
    }
}

fn release(inner: &mut LinkInner) {
    if let Some(writer) = inner.writer.take() {
        if let Err(err) = writer.get_ref().shutdown() {
            tracing::debug!(error = %err, "device shutdown failed");
        }
    }
}

fn error_event(reason: &str) -> DeviceEvent {
    DeviceEvent::now(EventKind::Error, json!({ "error": reason }))
}
