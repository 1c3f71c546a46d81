use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use telebridge_audit::{AuditSink, SqliteAuditSink};
use telebridge_hub::{BusServer, BusServerHandle, Hub, HubConfig, ReconnectPolicy, DEFAULT_BUS_PORT};
use telebridge_link::{DeviceOpener, LinkError, LinkManager, SerialConfig, SystemOpener};

use crate::error::{RelayError, Result};
use crate::ingress::CommandIngress;
use crate::observer::AuditObserver;
use crate::pump::{Pump, PumpExit};
use crate::relay::CommandRelay;
use crate::trail::AuditTrail;

const SUPERVISE_POLL: Duration = Duration::from_millis(50);

/// Audit path that selects an in-memory store.
pub const MEMORY_AUDIT_PATH: &str = ":memory:";

/// What to do when the link ends up `Closed` or `Faulted`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ReopenPolicy {
    /// Leave it down until someone calls [`Bridge::open_link`].
    #[default]
    Manual,
    /// Reopen with capped backoff, giving up after `max_attempts`
    /// consecutive failures if set.
    Backoff {
        policy: ReconnectPolicy,
        max_attempts: Option<u32>,
    },
}

/// Everything needed to assemble a bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub bus_host: String,
    pub bus_port: u16,
    pub audit_path: PathBuf,
    pub hub: HubConfig,
    pub reopen: ReopenPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            bus_host: "127.0.0.1".to_string(),
            bus_port: DEFAULT_BUS_PORT,
            audit_path: PathBuf::from("var").join("robot.db"),
            hub: HubConfig::default(),
            reopen: ReopenPolicy::Manual,
        }
    }
}

impl BridgeConfig {
    /// Open the audit store named by `audit_path`.
    pub fn open_audit_sink(&self) -> Result<Arc<dyn AuditSink>> {
        let sink = if self.audit_path.as_os_str() == MEMORY_AUDIT_PATH {
            SqliteAuditSink::open_in_memory()?
        } else {
            SqliteAuditSink::open(&self.audit_path)?
        };
        Ok(Arc::new(sink))
    }
}

struct Core {
    config: BridgeConfig,
    link: Arc<LinkManager>,
    trail: AuditTrail,
    relay: Arc<CommandRelay>,
    running: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<PumpExit>>>,
}

impl Core {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn open_link(&self) -> std::result::Result<(), LinkError> {
        let session = self.link.open()?;
        let pump = Pump::new(
            Arc::clone(&self.link),
            self.trail.clone(),
            Arc::clone(&self.running),
        );
        let spawned = thread::Builder::new()
            .name("telebridge-pump".to_string())
            .spawn(move || pump.run(session));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.link.fault(&format!("failed to start reader: {err}"));
                return Err(LinkError::Io(err));
            }
        };
        // A previous reader exits on its own once its session is stale.
        if let Some(previous) = lock(&self.pump).replace(handle) {
            let _ = previous.join();
        }
        Ok(())
    }

    // Sleeps in short slices; returns false if shutdown began meanwhile.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(SUPERVISE_POLL));
        }
        false
    }
}

/// Owns the link, hub, audit trail, and their threads for one process.
pub struct Bridge {
    core: Arc<Core>,
    bus: Mutex<Option<BusServerHandle>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self::with_opener(config, audit, SystemOpener)
    }

    pub fn with_opener(
        config: BridgeConfig,
        audit: Arc<dyn AuditSink>,
        opener: impl DeviceOpener + 'static,
    ) -> Self {
        let hub = Arc::new(Hub::new(config.hub.clone()));
        let trail = AuditTrail::new(audit, hub);
        let link = Arc::new(
            LinkManager::with_opener(config.serial.clone(), opener)
                .with_observer(Arc::new(AuditObserver::new(trail.clone()))),
        );
        let relay = Arc::new(CommandRelay::new(Arc::clone(&link), trail.clone()));
        Self {
            core: Arc::new(Core {
                config,
                link,
                trail,
                relay,
                running: Arc::new(AtomicBool::new(true)),
                pump: Mutex::new(None),
            }),
            bus: Mutex::new(None),
            supervisor: Mutex::new(None),
        }
    }

    /// Start the bus, try to open the link, and start the reopen supervisor
    /// if configured. A link that fails to open is audited, not fatal.
    pub fn start(&self) -> Result<SocketAddr> {
        let addr = self.start_bus()?;
        if let Err(err) = self.open_link() {
            tracing::warn!(error = %err, "serial link unavailable at startup");
        }
        self.start_supervisor();
        Ok(addr)
    }

    /// Bind the WebSocket bus and serve it on a background thread.
    pub fn start_bus(&self) -> Result<SocketAddr> {
        let config = &self.core.config;
        let ingress = Arc::new(CommandIngress::new(Arc::clone(&self.core.relay)));
        let server = BusServer::bind(
            format!("{}:{}", config.bus_host, config.bus_port),
            Arc::clone(self.hub()),
        )?
        .with_ingress(ingress)
        .with_running_flag(Arc::clone(&self.core.running));
        let handle = server.spawn()?;
        let addr = handle.local_addr();
        if let Some(previous) = lock(&self.bus).replace(handle) {
            previous.shutdown();
        }
        Ok(addr)
    }

    /// Open the device and start its reader.
    pub fn open_link(&self) -> Result<()> {
        self.core.open_link().map_err(RelayError::from)
    }

    fn start_supervisor(&self) {
        let ReopenPolicy::Backoff {
            policy,
            max_attempts,
        } = self.core.config.reopen.clone()
        else {
            return;
        };
        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name("telebridge-supervisor".to_string())
            .spawn(move || supervise(&core, &policy, max_attempts));
        match spawned {
            Ok(handle) => *lock(&self.supervisor) = Some(handle),
            Err(err) => tracing::warn!(error = %err, "failed to start link supervisor"),
        }
    }

    /// Stop every thread and release the device.
    ///
    /// The link is closed before the hub so subscribers still see the
    /// `serial.close` row. Safe to call more than once.
    pub fn shutdown(&self) {
        self.core.running.store(false, Ordering::SeqCst);
        self.core.link.close();
        self.hub().close();
        if let Some(bus) = lock(&self.bus).take() {
            bus.shutdown();
        }
        if let Some(supervisor) = lock(&self.supervisor).take() {
            let _ = supervisor.join();
        }
        if let Some(pump) = lock(&self.core.pump).take() {
            let _ = pump.join();
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.core.config
    }

    pub fn link(&self) -> &Arc<LinkManager> {
        &self.core.link
    }

    pub fn hub(&self) -> &Arc<Hub> {
        self.core.trail.hub()
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        self.core.trail.audit()
    }

    pub fn relay(&self) -> &Arc<CommandRelay> {
        &self.core.relay
    }

    /// Cleared on shutdown; share it with a signal handler.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.core.running)
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("link", &self.core.link)
            .field("hub", self.hub())
            .finish()
    }
}

fn supervise(core: &Core, policy: &ReconnectPolicy, max_attempts: Option<u32>) {
    let mut backoff = policy.backoff();
    while core.is_running() {
        if !core.link.state().can_open() {
            core.sleep(SUPERVISE_POLL);
            continue;
        }
        if max_attempts.is_some_and(|max| backoff.attempts() >= max) {
            tracing::warn!(attempts = backoff.attempts(), "giving up on reopening serial link");
            return;
        }
        let delay = backoff.next_delay();
        tracing::info!(delay_ms = delay.as_millis() as u64, "reopening serial link");
        if !core.sleep(delay) {
            return;
        }
        match core.open_link() {
            Ok(()) => backoff.reset(),
            Err(err) => tracing::warn!(error = %err, "serial link reopen failed"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;

    use serde_json::{json, Value};
    use telebridge_audit::MemoryAuditSink;
    use telebridge_hub::{bus_url, BusClient};
    use telebridge_link::{LinkState, LinkStream};
    use telebridge_protocol::{CommandKind, CommandRequest};

    use super::*;

    struct Streams(Mutex<Vec<UnixStream>>);

    impl DeviceOpener for Streams {
        fn open(&self, _config: &SerialConfig) -> std::io::Result<LinkStream> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .map(LinkStream::from_unix)
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    fn test_config(reopen: ReopenPolicy) -> BridgeConfig {
        BridgeConfig {
            serial: SerialConfig {
                read_timeout: Duration::from_millis(20),
                ..SerialConfig::new("unix:test", 115_200)
            },
            bus_port: 0,
            reopen,
            ..BridgeConfig::default()
        }
    }

    fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..300 {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn end_to_end_telemetry_and_command() {
        let (bridge_side, device) = UnixStream::pair().unwrap();
        let audit = Arc::new(MemoryAuditSink::new());
        let bridge = Bridge::with_opener(
            test_config(ReopenPolicy::Manual),
            audit.clone(),
            Streams(Mutex::new(vec![bridge_side])),
        );
        let addr = bridge.start().expect("bridge should start");
        assert_eq!(bridge.link().state(), LinkState::Ready);

        let mut client = BusClient::connect(&bus_url("127.0.0.1", addr.port())).expect("client");
        assert!(wait_until(|| bridge.hub().len() == 1));

        (&device)
            .write_all(b"{\"type\":\"telemetry\",\"data\":{\"distance_mm\":100,\"servo_us\":1500}}\n")
            .unwrap();
        let text = client
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .expect("telemetry");
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "telemetry");
        assert_eq!(value["data"]["pwm"], 90);

        client.send_json(&json!({"type": "led", "on": true})).unwrap();
        let mut line = String::new();
        BufReader::new(&device).read_line(&mut line).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&line).unwrap(), json!({"type": "led", "on": true}));

        // The sender sees the log broadcast and its own command_result.
        let mut result = None;
        for _ in 0..5 {
            let Some(text) = client.recv_timeout(Duration::from_secs(2)).unwrap() else {
                break;
            };
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["type"] == "command_result" {
                result = Some(value);
                break;
            }
        }
        let result = result.expect("command_result reply");
        assert_eq!(result["status"], 202);
        assert_eq!(result["row"]["action"], "cmd.led");

        bridge.shutdown();
        assert_eq!(bridge.link().state(), LinkState::Closed);
        assert!(bridge.hub().is_closed());
        let last = audit.query(1).unwrap();
        assert_eq!(last[0].action.as_deref(), Some("serial.close"));
    }

    #[test]
    fn manual_policy_leaves_link_down() {
        let (bridge_side, device) = UnixStream::pair().unwrap();
        let bridge = Bridge::with_opener(
            test_config(ReopenPolicy::Manual),
            Arc::new(MemoryAuditSink::new()),
            Streams(Mutex::new(vec![bridge_side])),
        );
        bridge.open_link().expect("open");
        drop(device);
        assert!(wait_until(|| bridge.link().state() == LinkState::Closed));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(bridge.link().state(), LinkState::Closed);
        let estop = CommandRequest::new(CommandKind::Estop);
        assert!(matches!(
            bridge.relay().send(&estop),
            Err(RelayError::LinkNotReady { .. })
        ));
    }

    #[test]
    fn backoff_policy_reopens_after_device_drop() {
        let (first, first_device) = UnixStream::pair().unwrap();
        let (second, _second_device) = UnixStream::pair().unwrap();
        let bridge = Bridge::with_opener(
            test_config(ReopenPolicy::Backoff {
                policy: ReconnectPolicy {
                    initial: Duration::from_millis(10),
                    factor: 2.0,
                    max: Duration::from_millis(50),
                },
                max_attempts: Some(5),
            }),
            Arc::new(MemoryAuditSink::new()),
            Streams(Mutex::new(vec![second, first])),
        );
        bridge.start().expect("bridge should start");
        assert_eq!(bridge.link().state(), LinkState::Ready);

        drop(first_device);
        let audit = Arc::clone(bridge.audit());
        assert!(wait_until(|| {
            audit
                .query(100)
                .unwrap()
                .iter()
                .filter(|r| r.action.as_deref() == Some("serial.open"))
                .count()
                == 2
        }));
        assert_eq!(bridge.link().state(), LinkState::Ready);
        bridge.shutdown();
    }

    #[test]
    fn memory_audit_path_opens_in_memory_store() {
        let config = BridgeConfig {
            audit_path: PathBuf::from(MEMORY_AUDIT_PATH),
            ..BridgeConfig::default()
        };
        let sink = config.open_audit_sink().expect("in-memory store");
        assert!(sink.query(10).unwrap().is_empty());
    }
}
