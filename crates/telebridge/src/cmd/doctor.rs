use std::net::TcpListener;
use std::path::Path;

use serde::Serialize;
use telebridge_audit::SqliteAuditSink;
use telebridge_link::DeviceEndpoint;
use telebridge_relay::MEMORY_AUDIT_PATH;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        serial_device_check(&args.serial.serial_path),
        audit_store_check(&args.audit.audit_path),
        bus_port_check(&args.bus.bus_host, args.bus.bus_port),
        compiled_features_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("telebridge doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<18} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

// A missing device only warns: the bridge still starts and audits the fault.
fn serial_device_check(path: &str) -> CheckResult {
    const NAME: &str = "serial_device";
    match DeviceEndpoint::parse(path) {
        DeviceEndpoint::Unix(socket) => {
            if socket.exists() {
                CheckResult::new(NAME, CheckStatus::Pass, format!("emulator socket {} present", socket.display()))
            } else {
                CheckResult::new(NAME, CheckStatus::Warn, format!("emulator socket {} not found", socket.display()))
            }
        }
        DeviceEndpoint::Serial(device) if cfg!(windows) => CheckResult::new(
            NAME,
            CheckStatus::Skip,
            format!("{device}: port presence is only checked on open"),
        ),
        DeviceEndpoint::Serial(device) => {
            if Path::new(&device).exists() {
                CheckResult::new(NAME, CheckStatus::Pass, format!("{device} present"))
            } else {
                CheckResult::new(NAME, CheckStatus::Warn, format!("{device} not found"))
            }
        }
    }
}

fn audit_store_check(path: &Path) -> CheckResult {
    const NAME: &str = "audit_store";
    if path.as_os_str() == MEMORY_AUDIT_PATH {
        return CheckResult::new(NAME, CheckStatus::Info, "in-memory store; records are lost on exit");
    }

    if path.exists() {
        return match SqliteAuditSink::open(path) {
            Ok(_) => CheckResult::new(NAME, CheckStatus::Pass, format!("{} opened", path.display())),
            Err(err) => CheckResult::new(
                NAME,
                CheckStatus::Fail,
                format!("{} unusable: {err}", path.display()),
            ),
        };
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let marker = dir.join(format!(".telebridge-doctor-{}", std::process::id()));
    let result = std::fs::create_dir_all(&dir).and_then(|()| std::fs::write(&marker, b"marker"));
    let _ = std::fs::remove_file(&marker);

    match result {
        Ok(()) => CheckResult::new(
            NAME,
            CheckStatus::Pass,
            format!("{} writable; {} will be created", dir.display(), path.display()),
        ),
        Err(err) => CheckResult::new(
            NAME,
            CheckStatus::Fail,
            format!("{} not writable: {err}", dir.display()),
        ),
    }
}

fn bus_port_check(host: &str, port: u16) -> CheckResult {
    const NAME: &str = "bus_port";
    match TcpListener::bind((host, port)) {
        Ok(_) => CheckResult::new(NAME, CheckStatus::Pass, format!("{host}:{port} available")),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => CheckResult::new(
            NAME,
            CheckStatus::Warn,
            format!("{host}:{port} in use; is a bridge already running?"),
        ),
        Err(err) => CheckResult::new(
            NAME,
            CheckStatus::Fail,
            format!("{host}:{port} cannot be bound: {err}"),
        ),
    }
}

fn compiled_features_check() -> CheckResult {
    let mut features = Vec::new();
    if cfg!(feature = "async") {
        features.push("async");
    }
    if cfg!(feature = "cli") {
        features.push("cli");
    }

    CheckResult::new("compiled_features", CheckStatus::Info, features.join(", "))
}
