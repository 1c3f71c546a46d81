use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use telebridge_hub::{bus_url, DEFAULT_BUS_PORT, DEFAULT_QUEUE_CAPACITY};
use telebridge_link::opener::default_serial_path;
use telebridge_link::DEFAULT_BAUD;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod doctor;
pub mod listen;
pub mod logs;
pub mod send;
pub mod serve;
pub mod version;

pub const DEFAULT_AUDIT_PATH: &str = "var/robot.db";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge: open the serial link and serve the message bus.
    Serve(ServeArgs),
    /// Submit one command through a running bridge.
    Send(SendArgs),
    /// Subscribe to the bus and print messages.
    Listen(ListenArgs),
    /// Print recent audit records, newest first.
    Logs(LogsArgs),
    /// Decode device lines offline (arguments or stdin).
    Decode(DecodeArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Logs(args) => logs::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct SerialArgs {
    /// Serial device path, or `unix:<socket>` for an emulated device.
    #[arg(long, env = "SERIAL_PATH", default_value = default_serial_path())]
    pub serial_path: String,
    /// Serial baud rate.
    #[arg(long, env = "SERIAL_BAUD", default_value_t = DEFAULT_BAUD)]
    pub serial_baud: u32,
}

#[derive(Args, Debug, Clone)]
pub struct BusArgs {
    /// Bus host to bind or connect to.
    #[arg(long, env = "BUS_HOST", default_value = "127.0.0.1")]
    pub bus_host: String,
    /// Bus TCP port.
    #[arg(long, env = "BUS_PORT", default_value_t = DEFAULT_BUS_PORT)]
    pub bus_port: u16,
}

impl BusArgs {
    pub fn url(&self) -> String {
        bus_url(&self.bus_host, self.bus_port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    /// Audit database path; `:memory:` keeps records in memory.
    #[arg(long, env = "AUDIT_PATH", default_value = DEFAULT_AUDIT_PATH)]
    pub audit_path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub serial: SerialArgs,
    #[command(flatten)]
    pub bus: BusArgs,
    #[command(flatten)]
    pub audit: AuditArgs,
    /// Per-subscriber queue capacity; the newest message is dropped when full.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Maximum device line length in bytes.
    #[arg(long, default_value_t = telebridge_frame::DEFAULT_MAX_LINE)]
    pub max_line: usize,
    /// Reopen the serial link with backoff after it closes or faults.
    #[arg(long)]
    pub reopen: bool,
    /// Give up reopening after N consecutive failures.
    #[arg(long, requires = "reopen")]
    pub reopen_max: Option<u32>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub bus: BusArgs,
    /// Full command object as JSON, e.g. '{"type":"led","on":true}'.
    #[arg(long, conflicts_with_all = ["kind", "field"])]
    pub json: Option<String>,
    /// Command type.
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: Option<String>,
    /// Extra command field as key=value; JSON values are parsed, anything else is a string.
    #[arg(long, value_name = "KEY=VALUE", requires = "kind")]
    pub field: Vec<String>,
    /// How long to wait for the command result (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub bus: BusArgs,
    /// Only print these message types (comma-separated: telemetry, log).
    #[arg(long, value_delimiter = ',')]
    pub types: Option<Vec<String>>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit instead of reconnecting when the bus goes away.
    #[arg(long)]
    pub no_reconnect: bool,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    #[command(flatten)]
    pub audit: AuditArgs,
    /// Number of records to return (1..=1000).
    #[arg(long, default_value_t = telebridge_audit::DEFAULT_QUERY_LIMIT)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Lines to decode. Reads stdin when empty.
    pub lines: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub serial: SerialArgs,
    #[command(flatten)]
    pub bus: BusArgs,
    #[command(flatten)]
    pub audit: AuditArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn bus_args_build_websocket_url() {
        let bus = BusArgs {
            bus_host: "10.0.0.5".into(),
            bus_port: 9000,
        };
        assert_eq!(bus.url(), "ws://10.0.0.5:9000/");
    }
}
