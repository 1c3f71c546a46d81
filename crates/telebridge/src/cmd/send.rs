use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use telebridge_hub::{BusClient, HubError};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{command_status_code, hub_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::output::{print_bus_message, OutputFormat};

const COMMAND_RESULT: &str = "command_result";

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let command = resolve_command(&args)?;

    let url = args.bus.url();
    let mut client = BusClient::connect(&url).map_err(|err| hub_error("connect failed", err))?;
    client
        .send_json(&command)
        .map_err(|err| hub_error("send failed", err))?;
    tracing::debug!(url = %url, command = %command, "command submitted");

    let (text, status) = wait_for_result(&mut client, timeout)?;
    let _ = client.close();

    print_bus_message(&text, format);
    Ok(command_status_code(status))
}

fn resolve_command(args: &SendArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str::<Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    let Some(kind) = &args.kind else {
        return Err(CliError::new(USAGE, "either --json or --type is required"));
    };

    let mut object = Map::new();
    object.insert("type".to_string(), Value::String(kind.clone()));
    for field in &args.field {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| CliError::new(USAGE, format!("--field must be KEY=VALUE: {field}")))?;
        if key.is_empty() || key == "type" {
            return Err(CliError::new(USAGE, format!("invalid --field key: {key:?}")));
        }
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        object.insert(key.to_string(), value);
    }
    Ok(Value::Object(object))
}

trait TextReceiver {
    fn recv_text(&mut self, timeout: Duration) -> Result<Option<String>, HubError>;
}

impl TextReceiver for BusClient {
    fn recv_text(&mut self, timeout: Duration) -> Result<Option<String>, HubError> {
        self.recv_timeout(timeout)
    }
}

/// Skip broadcast traffic until the reply addressed to this connection arrives.
fn wait_for_result<R: TextReceiver>(receiver: &mut R, timeout: Duration) -> CliResult<(String, u16)> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(
                TIMEOUT,
                format!("no command result within {}ms", timeout.as_millis()),
            ));
        }
        let Some(text) = receiver
            .recv_text(remaining)
            .map_err(|err| hub_error("receive failed", err))?
        else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if value.get("type").and_then(Value::as_str) != Some(COMMAND_RESULT) {
            continue;
        }
        let status = value
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|status| u16::try_from(status).ok())
            .unwrap_or(500);
        return Ok((text, status));
    }
}
