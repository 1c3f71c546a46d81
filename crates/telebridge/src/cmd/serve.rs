use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use telebridge_hub::{bus_url, HubConfig, ReconnectPolicy};
use telebridge_link::SerialConfig;
use telebridge_relay::{Bridge, BridgeConfig, ReopenPolicy};

use crate::cmd::{install_ctrlc_handler, ServeArgs};
use crate::exit::{relay_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_ready, OutputFormat, ReadyOutput};

const IDLE_POLL: Duration = Duration::from_millis(100);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = bridge_config(&args)?;
    let audit = config
        .open_audit_sink()
        .map_err(|err| relay_error("audit store unavailable", err))?;

    let bridge = Bridge::new(config, audit);
    install_ctrlc_handler(bridge.running_flag())?;

    let addr = bridge
        .start()
        .map_err(|err| relay_error("bridge start failed", err))?;
    tracing::info!(
        bus = %addr,
        serial = %bridge.config().serial.path,
        link = %bridge.link().state(),
        "bridge running"
    );

    print_ready(
        &ReadyOutput {
            event: "ready",
            bus: bus_url(&addr.ip().to_string(), addr.port()),
            serial: bridge.config().serial.path.clone(),
            link: bridge.link().state().as_str(),
            audit: bridge.config().audit_path.display().to_string(),
        },
        format,
    );

    let running = bridge.running_flag();
    while running.load(Ordering::SeqCst) {
        thread::sleep(IDLE_POLL);
    }

    tracing::info!("shutting down");
    bridge.shutdown();
    Ok(SUCCESS)
}

fn bridge_config(args: &ServeArgs) -> CliResult<BridgeConfig> {
    if args.queue_capacity == 0 {
        return Err(CliError::new(USAGE, "--queue-capacity must be at least 1"));
    }
    if args.max_line == 0 {
        return Err(CliError::new(USAGE, "--max-line must be at least 1"));
    }

    let mut serial = SerialConfig::new(args.serial.serial_path.clone(), args.serial.serial_baud);
    serial.max_line_len = args.max_line;

    let reopen = if args.reopen {
        ReopenPolicy::Backoff {
            policy: ReconnectPolicy::default(),
            max_attempts: args.reopen_max,
        }
    } else {
        ReopenPolicy::Manual
    };

    Ok(BridgeConfig {
        serial,
        bus_host: args.bus.bus_host.clone(),
        bus_port: args.bus.bus_port,
        audit_path: args.audit.audit_path.clone(),
        hub: HubConfig {
            queue_capacity: args.queue_capacity,
        },
        reopen,
    })
}
