use std::fmt;
use std::io;

use telebridge_audit::AuditError;
use telebridge_hub::HubError;
use telebridge_link::LinkError;
use telebridge_relay::RelayError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn hub_error(context: &str, err: HubError) -> CliError {
    match err {
        HubError::Bind { source, .. } | HubError::Accept(source) | HubError::Io(source) => {
            io_error(context, source)
        }
        HubError::WebSocket(tungstenite_err) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {tungstenite_err}"))
        }
        HubError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        HubError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Open { source, .. } | LinkError::Io(source) => io_error(context, source),
        LinkError::Frame(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        LinkError::WriteTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

pub fn audit_error(context: &str, err: AuditError) -> CliError {
    match err {
        AuditError::Io { source, .. } => io_error(context, source),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn relay_error(context: &str, err: RelayError) -> CliError {
    match err {
        RelayError::InvalidCommand(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RelayError::Link(err) => link_error(context, err),
        RelayError::Audit(err) => audit_error(context, err),
        RelayError::Hub(err) => hub_error(context, err),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

/// Exit code for a relayed command's HTTP-equivalent status.
pub fn command_status_code(status: u16) -> i32 {
    match status {
        200..=299 => SUCCESS,
        400..=499 => DATA_INVALID,
        _ => FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_by_kind() {
        let err = io_error("x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
        let err = io_error("x", io::Error::from(io::ErrorKind::AddrInUse));
        assert_eq!(err.code, TRANSPORT_ERROR);
        let err = io_error("x", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn relay_invalid_command_is_data_invalid() {
        let err = relay_error("submit", RelayError::InvalidCommand("dance".into()));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("dance"));
    }

    #[test]
    fn stalled_device_write_is_timeout() {
        let err = relay_error(
            "send",
            RelayError::Link(LinkError::WriteTimeout {
                after: std::time::Duration::from_secs(1),
            }),
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.contains("1000ms"));
    }

    #[test]
    fn bind_failure_keeps_io_kind() {
        let err = hub_error(
            "bind",
            HubError::Bind {
                addr: "127.0.0.1:7071".into(),
                source: io::Error::from(io::ErrorKind::AddrInUse),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn command_status_maps_to_exit_codes() {
        assert_eq!(command_status_code(202), SUCCESS);
        assert_eq!(command_status_code(422), DATA_INVALID);
        assert_eq!(command_status_code(500), FAILURE);
    }
}
