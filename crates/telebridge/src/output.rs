use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use telebridge_protocol::{AuditRecord, Decoded};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

/// Emitted once by `serve` after the bus is listening.
#[derive(Debug, Serialize)]
pub struct ReadyOutput {
    pub event: &'static str,
    pub bus: String,
    pub serial: String,
    pub link: &'static str,
    pub audit: String,
}

pub fn print_ready(ready: &ReadyOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(ready),
        OutputFormat::Raw => print_raw(ready.bus.as_bytes()),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "bus listening on {} (serial {} is {}, audit {})",
                ready.bus, ready.serial, ready.link, ready.audit
            );
        }
    }
}

/// Print one text message received from the bus.
pub fn print_bus_message(text: &str, format: OutputFormat) {
    let parsed: Option<Value> = serde_json::from_str(text).ok();
    match (format, parsed) {
        (OutputFormat::Raw, _) | (_, None) => print_raw(text.as_bytes()),
        (OutputFormat::Json, Some(value)) => print_json(&value),
        (OutputFormat::Table | OutputFormat::Pretty, Some(value)) => {
            println!("{}", summarize_bus_message(&value));
        }
    }
}

fn summarize_bus_message(value: &Value) -> String {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or("?");
    match kind {
        "telemetry" => {
            let data = value.get("data").unwrap_or(&Value::Null);
            format!(
                "telemetry distance_cm={} pwm={} ts={}",
                field_text(data.get("distance_cm")),
                field_text(data.get("pwm")),
                field_text(data.get("ts"))
            )
        }
        "log" => {
            let row = value.get("row").unwrap_or(&Value::Null);
            format!(
                "log #{} [{}] {} {} status={} {}",
                field_text(row.get("id")),
                field_text(row.get("level")),
                field_text(row.get("source")),
                field_text(row.get("action")),
                field_text(row.get("status_code")),
                field_text(row.get("payload"))
            )
        }
        "command_result" => format!(
            "command_result status={} ok={} {}",
            field_text(value.get("status")),
            field_text(value.get("ok")),
            field_text(value.get("message"))
        ),
        other => format!("{other} {value}"),
    }
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn print_records(records: &[AuditRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "TS", "LEVEL", "SOURCE", "ACTION", "STATUS", "PAYLOAD"]);
            for record in records {
                table.add_row(vec![
                    record.id.to_string(),
                    record.ts.clone(),
                    record.level.as_str().to_string(),
                    record.source.clone(),
                    record.action.clone().unwrap_or_default(),
                    record
                        .status_code
                        .map(|code| code.to_string())
                        .unwrap_or_default(),
                    record.payload.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for record in records {
                println!(
                    "#{} {} [{}] {} {} status={} {}",
                    record.id,
                    record.ts,
                    record.level.as_str(),
                    record.source,
                    record.action.as_deref().unwrap_or("-"),
                    record
                        .status_code
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    record.payload.as_deref().unwrap_or("")
                );
            }
        }
        OutputFormat::Raw => {
            for record in records {
                print_raw(record.payload.as_deref().unwrap_or("").as_bytes());
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct DecodeOutput<'a> {
    line: &'a str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    telemetry: Option<&'a telebridge_protocol::TelemetrySample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a telebridge_protocol::DeviceEvent>,
}

pub fn print_decoded(line: &str, decoded: &Decoded, format: OutputFormat) {
    let out = decode_output(line, decoded);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Raw => print_raw(out.kind.as_bytes()),
        OutputFormat::Table | OutputFormat::Pretty => match decoded {
            Decoded::Telemetry(sample) => println!(
                "telemetry    distance_cm={} pwm={}  <- {line}",
                sample
                    .distance_cm()
                    .map(|cm| cm.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                sample
                    .pwm()
                    .map(|pwm| pwm.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Decoded::Device(event) => println!("{:<12} {}", event.kind.as_str(), event.payload),
            Decoded::Unrecognized(raw) => println!("unrecognized {raw}"),
        },
    }
}

fn decode_output<'a>(line: &'a str, decoded: &'a Decoded) -> DecodeOutput<'a> {
    let (telemetry, event) = match decoded {
        Decoded::Telemetry(sample) => (Some(sample), None),
        Decoded::Device(event) => (None, Some(event)),
        Decoded::Unrecognized(_) => (None, None),
    };
    DecodeOutput {
        line,
        kind: decoded.kind(),
        telemetry,
        event,
    }
}
