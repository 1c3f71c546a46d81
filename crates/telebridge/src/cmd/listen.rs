use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use telebridge_hub::{BusClient, HubError, ReconnectPolicy};

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{hub_error, CliResult, SUCCESS};
use crate::output::{print_bus_message, OutputFormat};

const RECV_POLL: Duration = Duration::from_millis(200);
const SLEEP_SLICE: Duration = Duration::from_millis(50);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let url = args.bus.url();
    let mut backoff = ReconnectPolicy::default().backoff();
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let mut client = match BusClient::connect(&url) {
            Ok(client) => {
                if backoff.attempts() > 0 {
                    tracing::info!(url = %url, "reconnected to bus");
                }
                backoff.reset();
                client
            }
            Err(err) => {
                if args.no_reconnect {
                    return Err(hub_error("connect failed", err));
                }
                let delay = backoff.next_delay();
                tracing::warn!(
                    url = %url,
                    error = %err,
                    retry_ms = delay.as_millis() as u64,
                    attempt = backoff.attempts(),
                    "bus unavailable, retrying"
                );
                sleep_while_running(&running, delay);
                continue;
            }
        };

        while running.load(Ordering::SeqCst) {
            let text = match client.recv_timeout(RECV_POLL) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(HubError::Closed) if args.no_reconnect => return Ok(SUCCESS),
                Err(err) if args.no_reconnect => return Err(hub_error("receive failed", err)),
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "bus connection lost");
                    break;
                }
            };

            if !wanted(args.types.as_deref(), &text) {
                continue;
            }
            print_bus_message(&text, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    let _ = client.close();
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

fn wanted(types: Option<&[String]>, text: &str) -> bool {
    let Some(types) = types else {
        return true;
    };
    let kind = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| value.get("type").and_then(Value::as_str).map(str::to_string));
    match kind {
        Some(kind) => types.iter().any(|t| t.eq_ignore_ascii_case(&kind)),
        None => false,
    }
}

fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filter_accepts_everything() {
        assert!(wanted(None, "not json"));
        assert!(wanted(None, "{\"type\":\"log\"}"));
    }

    #[test]
    fn filter_matches_type_field() {
        let types = vec!["telemetry".to_string()];
        assert!(wanted(Some(&types), "{\"type\":\"telemetry\",\"data\":{}}"));
        assert!(!wanted(Some(&types), "{\"type\":\"log\",\"row\":{}}"));
        assert!(!wanted(Some(&types), "garbage"));
    }

    #[test]
    fn sleep_returns_early_once_stopped() {
        let running = AtomicBool::new(false);
        let started = Instant::now();
        sleep_while_running(&running, Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
