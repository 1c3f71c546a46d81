use std::path::PathBuf;
use std::time::Duration;

use telebridge_frame::DEFAULT_MAX_LINE;

use crate::stream::LinkStream;

/// Default device baud rate.
pub const DEFAULT_BAUD: u32 = 115_200;

const UNIX_PREFIX: &str = "unix:";

/// Where and how to reach the device.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial device path, or `unix:<socket>` for an emulator.
    pub path: String,
    pub baud: u32,
    /// Poll interval for the reader; bounds how long shutdown waits.
    pub read_timeout: Duration,
    /// Upper bound on a single line write.
    pub write_timeout: Duration,
    /// Maximum line length in either direction.
    pub max_line_len: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: default_serial_path().to_string(),
            baud: DEFAULT_BAUD,
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_secs(1),
            max_line_len: DEFAULT_MAX_LINE,
        }
    }
}

impl SerialConfig {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::parse(&self.path)
    }
}

/// Platform default device path.
pub fn default_serial_path() -> &'static str {
    if cfg!(windows) {
        "COM4"
    } else {
        "/dev/ttyACM0"
    }
}

/// A parsed device path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEndpoint {
    Serial(String),
    /// Unix socket served by a device emulator.
    Unix(PathBuf),
}

impl DeviceEndpoint {
    pub fn parse(path: &str) -> Self {
        match path.strip_prefix(UNIX_PREFIX) {
            Some(socket) => DeviceEndpoint::Unix(PathBuf::from(socket)),
            None => DeviceEndpoint::Serial(path.to_string()),
        }
    }
}

/// Opens the physical device. Only the link manager calls this.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, config: &SerialConfig) -> std::io::Result<LinkStream>;
}

/// Opens serial ports through `serialport`, and `unix:` paths as sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl DeviceOpener for SystemOpener {
    fn open(&self, config: &SerialConfig) -> std::io::Result<LinkStream> {
        match config.endpoint() {
            DeviceEndpoint::Serial(path) => {
                let port = serialport::new(path, config.baud)
                    .timeout(config.read_timeout)
                    .open()?;
                Ok(LinkStream::from_serial(port))
            }
            #[cfg(unix)]
            DeviceEndpoint::Unix(socket) => {
                let stream = std::os::unix::net::UnixStream::connect(socket)?;
                Ok(LinkStream::from_unix(stream))
            }
            #[cfg(not(unix))]
            DeviceEndpoint::Unix(socket) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("unix socket devices are not supported here: {}", socket.display()),
            )),
        }
    }
}
