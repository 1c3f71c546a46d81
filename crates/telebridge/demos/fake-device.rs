//! Fake controller on a Unix socket, for running the bridge without hardware.
//!
//! Emits telemetry every 300 ms (mixing JSON records and legacy
//! `Dist: N mm` lines) and acknowledges every command it receives.
//!
//! Run with:
//!   cargo run -p telebridge --example fake-device -- /tmp/telebridge-fake.sock
//!
//! In another terminal:
//!   cargo run -p telebridge --features cli -- serve --serial-path unix:/tmp/telebridge-fake.sock \
//!     --audit-path :memory:
//!   cargo run -p telebridge --features cli -- send --type led --field on=true

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::os::unix::net::UnixListener;
    use std::path::PathBuf;

    let sock_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("telebridge-fake.sock"));

    // Ensure no stale socket
    let _ = std::fs::remove_file(&sock_path);

    let listener = UnixListener::bind(&sock_path)?;
    eprintln!("Fake device listening on {}", sock_path.display());

    for stream in listener.incoming() {
        let stream = stream?;
        eprintln!("Bridge connected");
        if let Err(err) = device::serve(stream) {
            eprintln!("Bridge disconnected: {err}");
        }
    }

    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("fake-device needs Unix domain sockets");
}

#[cfg(unix)]
mod device {
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde_json::{json, Value};
    use telebridge::frame::{FrameError, LineReader, LineWriter};

    const TICK: Duration = Duration::from_millis(300);

    pub fn serve(stream: UnixStream) -> Result<(), FrameError> {
        let writer = Arc::new(Mutex::new(LineWriter::new(stream.try_clone()?)));
        let connected = Arc::new(AtomicBool::new(true));

        let ticker = {
            let writer = Arc::clone(&writer);
            let connected = Arc::clone(&connected);
            thread::spawn(move || emit_telemetry(&writer, &connected))
        };

        let mut reader = LineReader::new(stream);
        let result = loop {
            let record = match reader.read_line() {
                Ok(record) => record,
                Err(FrameError::ConnectionClosed) => break Ok(()),
                Err(FrameError::LineTooLong { size, .. }) => {
                    eprintln!("ignoring oversized command ({size} bytes)");
                    continue;
                }
                Err(err) => break Err(err),
            };
            eprintln!("<- {}", record.text());
            let reply = acknowledge(record.text());
            let sent = writer
                .lock()
                .map_err(|_| FrameError::ConnectionClosed)
                .and_then(|mut w| w.send_line(&reply).map(|_| ()));
            if let Err(err) = sent {
                break Err(err);
            }
        };

        connected.store(false, Ordering::SeqCst);
        let _ = ticker.join();
        result
    }

    fn acknowledge(line: &str) -> String {
        match serde_json::from_str::<Value>(line) {
            Ok(command) => {
                let kind = command.get("type").cloned().unwrap_or(Value::Null);
                json!({"type": "ack", "cmd": kind, "ok": true, "echo": command}).to_string()
            }
            Err(_) => format!("unparsed command: {line}"),
        }
    }

    fn emit_telemetry(writer: &Mutex<LineWriter<UnixStream>>, connected: &AtomicBool) {
        let mut tick: u64 = 0;
        while connected.load(Ordering::SeqCst) {
            let line = telemetry_line(tick);
            let sent = match writer.lock() {
                Ok(mut w) => w.send_line(&line).is_ok(),
                Err(_) => false,
            };
            if !sent {
                return;
            }
            tick = tick.wrapping_add(1);
            thread::sleep(TICK);
        }
    }

    // Sweeps the distance between 50 and 1050 mm and the servo across its range.
    fn telemetry_line(tick: u64) -> String {
        let distance_mm = 50 + (tick * 37) % 1000;
        let servo_us = 500 + (tick * 125) % 2001;
        if tick % 5 == 4 {
            return format!("Dist: {distance_mm} mm");
        }
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        json!({
            "type": "telemetry",
            "data": {"distance_mm": distance_mm, "servo_us": servo_us, "ts": ts}
        })
        .to_string()
    }
}
