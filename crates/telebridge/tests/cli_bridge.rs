#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;
use telebridge::frame::LineReader;
use telebridge::hub::BusClient;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/tbcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should work");
    listener.local_addr().expect("addr should resolve").port()
}

fn telebridge() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_telebridge"));
    cmd.arg("--log-level").arg("error");
    cmd
}

struct Serve {
    child: Child,
    _stdout: BufReader<ChildStdout>,
    ready: Value,
}

impl Serve {
    fn start(serial_path: &str, audit_path: &Path) -> Self {
        let mut child = telebridge()
            .arg("--format")
            .arg("json")
            .arg("serve")
            .arg("--serial-path")
            .arg(serial_path)
            .arg("--bus-host")
            .arg("127.0.0.1")
            .arg("--bus-port")
            .arg("0")
            .arg("--audit-path")
            .arg(audit_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");

        let mut stdout = BufReader::new(child.stdout.take().expect("stdout should be piped"));
        let mut line = String::new();
        stdout
            .read_line(&mut line)
            .expect("ready line should be readable");
        let ready: Value = serde_json::from_str(&line).expect("ready line should be json");
        assert_eq!(ready["event"], "ready");

        Self {
            child,
            _stdout: stdout,
            ready,
        }
    }

    fn bus_url(&self) -> String {
        self.ready["bus"]
            .as_str()
            .expect("bus url should be a string")
            .to_string()
    }

    fn bus_port(&self) -> String {
        self.bus_url()
            .trim_end_matches('/')
            .rsplit(':')
            .next()
            .expect("bus url should carry a port")
            .to_string()
    }

    fn send(&self, args: &[&str]) -> std::process::Output {
        telebridge()
            .arg("--format")
            .arg("json")
            .arg("send")
            .arg("--bus-host")
            .arg("127.0.0.1")
            .arg("--bus-port")
            .arg(self.bus_port())
            .args(args)
            .output()
            .expect("send should run")
    }

    fn stop(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn read_logs(audit_path: &Path) -> Vec<Value> {
    let output = telebridge()
        .arg("--format")
        .arg("json")
        .arg("logs")
        .arg("--audit-path")
        .arg(audit_path)
        .arg("--limit")
        .arg("50")
        .output()
        .expect("logs should run");
    assert!(output.status.success(), "logs failed: {output:?}");
    let rows: Value = serde_json::from_slice(&output.stdout).expect("logs should print json");
    rows.as_array().expect("logs should be an array").clone()
}

fn actions(rows: &[Value]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row["action"].as_str().map(str::to_string))
        .collect()
}

#[test]
fn serve_relays_commands_and_broadcasts_telemetry() {
    let dir = unique_temp_dir("serve");
    let sock_path = dir.join("device.sock");
    let audit_path = dir.join("robot.db");
    let device_listener = UnixListener::bind(&sock_path).expect("device socket should bind");

    let serve = Serve::start(&format!("unix:{}", sock_path.display()), &audit_path);
    assert_eq!(serve.ready["link"], "ready");

    let (device, _) = device_listener.accept().expect("bridge should connect to device");
    device
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should apply");
    let mut device_reader = LineReader::new(device.try_clone().expect("clone should work"));

    let output = serve.send(&["--type", "led", "--field", "on=true"]);
    assert!(output.status.success(), "send failed: {output:?}");
    let result: Value = serde_json::from_slice(&output.stdout).expect("result should be json");
    assert_eq!(result["type"], "command_result");
    assert_eq!(result["status"], 202);
    assert_eq!(result["row"]["action"], "cmd.led");

    let line = device_reader.read_line().expect("device should receive command");
    let command: Value = serde_json::from_str(line.text()).expect("command line should be json");
    assert_eq!(command, serde_json::json!({"type": "led", "on": true}));

    let output = serve.send(&["--type", "dance"]);
    assert_eq!(output.status.code(), Some(60));
    let result: Value = serde_json::from_slice(&output.stdout).expect("result should be json");
    assert_eq!(result["status"], 422);
    assert_eq!(result["message"], "invalid command type");

    let mut client = BusClient::connect(&serve.bus_url()).expect("bus should accept");
    let telemetry = wait_for_telemetry(&mut client, &device);
    assert_eq!(telemetry["data"]["distance_cm"], 25.0);
    assert_eq!(telemetry["data"]["pwm"], 90);
    let _ = client.close();

    serve.stop();

    let rows = read_logs(&audit_path);
    let actions = actions(&rows);
    assert!(actions.contains(&"serial.open".to_string()), "{actions:?}");
    assert!(actions.contains(&"cmd.led".to_string()), "{actions:?}");
    assert!(actions.contains(&"cmd.invalid".to_string()), "{actions:?}");
    let first = rows[0]["id"].as_i64().expect("id should be numeric");
    let last = rows[rows.len() - 1]["id"].as_i64().expect("id should be numeric");
    assert!(first > last, "logs should be newest first");

    let _ = std::fs::remove_dir_all(&dir);
}

// Keeps writing until the subscription registered after the handshake sees one.
fn wait_for_telemetry(client: &mut BusClient, device: &UnixStream) -> Value {
    let mut device = device;
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        device
            .write_all(b"{\"type\":\"telemetry\",\"data\":{\"distance_mm\":250,\"servo_us\":1500}}\n")
            .expect("device write should succeed");
        while let Some(text) = client
            .recv_timeout(Duration::from_millis(100))
            .expect("bus should stay open")
        {
            let value: Value = serde_json::from_str(&text).expect("bus message should be json");
            if value["type"] == "telemetry" {
                return value;
            }
        }
    }
    panic!("no telemetry received");
}

#[test]
fn serve_without_device_stays_up_and_rejects_commands() {
    let dir = unique_temp_dir("nodev");
    let audit_path = dir.join("robot.db");
    let missing = format!("unix:{}", dir.join("absent.sock").display());

    let serve = Serve::start(&missing, &audit_path);
    assert_eq!(serve.ready["link"], "faulted");

    let output = serve.send(&["--type", "estop"]);
    assert_eq!(output.status.code(), Some(1));
    let result: Value = serde_json::from_slice(&output.stdout).expect("result should be json");
    assert_eq!(result["status"], 500);
    assert_eq!(result["ok"], false);

    serve.stop();

    let actions = actions(&read_logs(&audit_path));
    assert!(actions.contains(&"serial.error".to_string()), "{actions:?}");
    assert!(actions.contains(&"cmd.tx.fail".to_string()), "{actions:?}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_without_bridge_is_transport_error() {
    let output = telebridge()
        .arg("send")
        .arg("--bus-host")
        .arg("127.0.0.1")
        .arg("--bus-port")
        .arg(free_port().to_string())
        .arg("--type")
        .arg("led")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn decode_arguments_prints_tagged_results() {
    let output = telebridge()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg("Dist: 250 mm")
        .arg("{\"type\":\"ack\",\"cmd\":\"led\"}")
        .arg("{not json")
        .output()
        .expect("decode should run");

    assert!(output.status.success());
    let lines: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("decode line should be json"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["kind"], "telemetry");
    assert_eq!(lines[0]["telemetry"]["distance_cm"], 25.0);
    assert_eq!(lines[1]["kind"], "ack");
    assert_eq!(lines[2]["kind"], "unrecognized");
}

#[test]
fn decode_reads_stdin_with_link_framing() {
    let mut child = telebridge()
        .arg("--format")
        .arg("raw")
        .arg("decode")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");

    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"\r\n{\"type\":\"telemetry\",\"servo_us\":2500}\r\n\n   \nhello\npartial")
        .expect("stdin write should succeed");

    let output = child.wait_with_output().expect("decode should finish");
    assert!(output.status.success());
    let kinds: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(kinds, vec!["telemetry", "unrecognized"]);
}

#[test]
fn logs_without_store_is_usage_error() {
    let dir = unique_temp_dir("nologs");
    let output = telebridge()
        .arg("logs")
        .arg("--audit-path")
        .arg(dir.join("missing.db"))
        .output()
        .expect("logs should run");

    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn doctor_passes_with_memory_store() {
    let output = telebridge()
        .arg("--format")
        .arg("json")
        .arg("doctor")
        .arg("--serial-path")
        .arg("unix:/nonexistent/telebridge.sock")
        .arg("--audit-path")
        .arg(":memory:")
        .arg("--bus-port")
        .arg(free_port().to_string())
        .output()
        .expect("doctor should run");

    assert!(output.status.success(), "doctor failed: {output:?}");
    let report: Value = serde_json::from_slice(&output.stdout).expect("doctor should print json");
    assert_eq!(report["overall"], "pass");
    assert_eq!(report["checks"].as_array().map(Vec::len), Some(4));
}

#[test]
fn version_reports_package_version() {
    let output = telebridge()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("telebridge {}", env!("CARGO_PKG_VERSION"))
    );
}
