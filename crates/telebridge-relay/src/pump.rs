use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use telebridge_frame::FrameError;
use telebridge_hub::Hub;
use telebridge_link::{LinkManager, LinkSession};
use telebridge_protocol::{AuditEntry, AuditLevel, BusMessage, Decoded, Decoder};

use crate::trail::{AuditTrail, SOURCE_SERIAL};

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// The running flag cleared.
    Shutdown,
    /// The device closed the stream.
    EndOfStream,
    /// The device stream failed; the link was faulted.
    Fault(String),
    /// The link was closed or reopened under this session.
    Superseded,
}

/// The single reader: device lines -> decoder -> hub and audit trail.
pub struct Pump {
    link: Arc<LinkManager>,
    hub: Arc<Hub>,
    trail: AuditTrail,
    decoder: Decoder,
    running: Arc<AtomicBool>,
}

impl Pump {
    pub fn new(
        link: Arc<LinkManager>,
        trail: AuditTrail,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            link,
            hub: Arc::clone(trail.hub()),
            trail,
            decoder: Decoder::new(),
            running,
        }
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Read until shutdown, end of stream, or a device fault.
    ///
    /// Framing and decode problems are recovered here and never end the
    /// loop.
    pub fn run(&self, mut session: LinkSession) -> PumpExit {
        let generation = session.generation;
        tracing::debug!(generation, "reader started");
        let exit = loop {
            if !self.running.load(Ordering::SeqCst) {
                break PumpExit::Shutdown;
            }
            match session.reader.read_line() {
                Ok(record) => self.handle_line(record.text()),
                Err(FrameError::LineTooLong { size, max }) => {
                    tracing::warn!(size, max, "device line too long; discarded");
                    self.trail.record(
                        AuditEntry::new(AuditLevel::Warn, SOURCE_SERIAL, "serial.overflow")
                            .with_payload(json!({ "size": size, "max": max }))
                            .with_status(413),
                    );
                }
                Err(err) if err.is_timeout() => {
                    if !self.link.is_current(generation) {
                        break PumpExit::Superseded;
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    self.link.session_closed(generation);
                    break PumpExit::EndOfStream;
                }
                Err(FrameError::EmbeddedNewline) => {}
                Err(FrameError::Io(err)) => {
                    let reason = err.to_string();
                    if !self.running.load(Ordering::SeqCst) {
                        break PumpExit::Shutdown;
                    }
                    self.link.session_fault(generation, &reason);
                    break PumpExit::Fault(reason);
                }
            }
        };
        tracing::debug!(generation, ?exit, "reader stopped");
        exit
    }

    /// Decode one line and route it.
    pub fn handle_line(&self, line: &str) {
        match self.decoder.decode(line) {
            Decoded::Telemetry(sample) => {
                tracing::debug!(
                    distance_cm = ?sample.distance_cm(),
                    pwm = ?sample.pwm(),
                    ts = sample.timestamp(),
                    "telemetry"
                );
                self.hub.publish(&BusMessage::Telemetry { data: sample });
            }
            Decoded::Device(event) => {
                self.trail.record(
                    AuditEntry::new(AuditLevel::Info, SOURCE_SERIAL, format!("stm32.{}", event.kind))
                        .with_payload(event.payload)
                        .with_status(200),
                );
            }
            Decoded::Unrecognized(raw) => {
                tracing::trace!(line = %raw, "unrecognized device line");
                self.trail.record(
                    AuditEntry::new(AuditLevel::Info, SOURCE_SERIAL, "stm32.line")
                        .with_payload(Value::String(raw))
                        .with_status(200),
                );
            }
        }
    }
}

impl std::fmt::Debug for Pump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump")
            .field("decoder", &self.decoder)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::sync::Mutex;
    use std::time::Duration;

    use telebridge_audit::{AuditSink, MemoryAuditSink};
    use telebridge_link::{DeviceOpener, LinkState, LinkStream, SerialConfig};

    use super::*;
    use crate::observer::AuditObserver;

    struct OneShot(Mutex<Option<UnixStream>>);

    impl DeviceOpener for OneShot {
        fn open(&self, _config: &SerialConfig) -> std::io::Result<LinkStream> {
            self.0
                .lock()
                .unwrap()
                .take()
                .map(LinkStream::from_unix)
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    fn setup(max_line_len: usize) -> (Pump, Arc<MemoryAuditSink>, Arc<Hub>, UnixStream, LinkSession) {
        let (bridge_side, device) = UnixStream::pair().expect("socket pair");
        let audit = Arc::new(MemoryAuditSink::new());
        let hub = Arc::new(Hub::default());
        let trail = AuditTrail::new(audit.clone(), hub.clone());
        let config = SerialConfig {
            read_timeout: Duration::from_millis(20),
            max_line_len,
            ..SerialConfig::new("unix:test", 115_200)
        };
        let link = Arc::new(
            LinkManager::with_opener(config, OneShot(Mutex::new(Some(bridge_side))))
                .with_observer(Arc::new(AuditObserver::new(trail.clone()))),
        );
        let session = link.open().expect("open");
        let pump = Pump::new(link, trail, Arc::new(AtomicBool::new(true)));
        (pump, audit, hub, device, session)
    }

    fn actions(audit: &MemoryAuditSink) -> Vec<String> {
        audit
            .snapshot()
            .into_iter()
            .filter_map(|row| row.action)
            .collect()
    }

    #[test]
    fn routes_every_record_kind_then_closes_on_eof() {
        let (pump, audit, hub, mut device, session) = setup(4096);
        let watcher = hub.subscribe().expect("subscribe");

        device
            .write_all(
                b"{\"type\":\"telemetry\",\"data\":{\"distance_mm\":100,\"servo_us\":1500}}\n\
                  \n\
                  Dist: 250 mm\n\
                  {\"type\":\"ack\",\"cmd\":\"led\"}\n\
                  {not json\n",
            )
            .unwrap();
        drop(device);

        assert_eq!(pump.run(session), PumpExit::EndOfStream);
        assert_eq!(pump.link.state(), LinkState::Closed);
        assert_eq!(
            actions(&audit),
            vec!["serial.opening", "serial.open", "stm32.ack", "stm32.line", "serial.close"]
        );

        let mut telemetry = Vec::new();
        while let Some(text) = watcher.try_recv().unwrap() {
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["type"] == "telemetry" {
                telemetry.push(value["data"].clone());
            }
        }
        assert_eq!(telemetry.len(), 2);
        assert_eq!(telemetry[0]["distance_cm"], 10.0);
        assert_eq!(telemetry[0]["pwm"], 90);
        assert_eq!(telemetry[1]["distance_cm"], 25.0);
        assert!(telemetry[1]["pwm"].is_null());
    }

    #[test]
    fn oversized_line_is_audited_and_reader_continues() {
        let (pump, audit, _hub, mut device, session) = setup(32);
        device.write_all(&[b'x'; 64]).unwrap();
        device.write_all(b"\n{\"type\":\"event\",\"n\":1}\n").unwrap();
        drop(device);

        assert_eq!(pump.run(session), PumpExit::EndOfStream);
        let rows = audit.query(10).unwrap();
        let overflow = rows
            .iter()
            .find(|r| r.action.as_deref() == Some("serial.overflow"))
            .expect("overflow row");
        assert_eq!(overflow.status_code, Some(413));
        assert!(actions(&audit).contains(&"stm32.event".to_string()));
    }

    #[test]
    fn closing_the_link_stops_the_reader() {
        let (pump, _audit, _hub, _device, session) = setup(4096);
        let link = Arc::clone(&pump.link);
        let handle = std::thread::spawn(move || pump.run(session));
        std::thread::sleep(Duration::from_millis(50));
        link.close();
        let exit = handle.join().expect("pump thread");
        assert!(matches!(exit, PumpExit::EndOfStream | PumpExit::Superseded));
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[test]
    fn running_flag_stops_the_reader() {
        let (pump, _audit, _hub, _device, session) = setup(4096);
        pump.running.store(false, Ordering::SeqCst);
        assert_eq!(pump.run(session), PumpExit::Shutdown);
    }
}
