use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;

/// Extra filter directives, e.g. `TELEBRIDGE_LOG=tungstenite=debug`.
pub const LOG_ENV: &str = "TELEBRIDGE_LOG";

// Targets that follow `--log-level`; everything else stays at warn or quieter.
const WORKSPACE_TARGETS: [&str; 7] = [
    "telebridge",
    "telebridge_frame",
    "telebridge_protocol",
    "telebridge_link",
    "telebridge_hub",
    "telebridge_audit",
    "telebridge_relay",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Bridge crates log at `level`; websocket and sqlite internals are capped
/// at warn. `overrides` is a comma-separated directive list applied last.
///
/// Returns the filter and any override directives that failed to parse.
pub fn build_filter(level: LogLevel, overrides: Option<&str>) -> (EnvFilter, Vec<String>) {
    let level = level.as_filter();
    let mut filter = EnvFilter::default().add_directive(Directive::from(LevelFilter::WARN.min(level)));
    for target in WORKSPACE_TARGETS {
        if let Ok(directive) = format!("{target}={level}").parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    let mut rejected = Vec::new();
    for raw in overrides
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
    {
        match raw.parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(err) => rejected.push(format!("{raw}: {err}")),
        }
    }
    (filter, rejected)
}

fn build_subscriber<W>(
    format: LogFormat,
    filter: EnvFilter,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => Box::new(builder.finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
    }
}

/// Install the stderr subscriber. Stdout stays reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel, overrides: Option<&str>) {
    let (filter, rejected) = build_filter(level, overrides);
    let _ = build_subscriber(format, filter, std::io::stderr).try_init();
    for directive in rejected {
        tracing::warn!(env = LOG_ENV, %directive, "ignoring log directive");
    }
}
