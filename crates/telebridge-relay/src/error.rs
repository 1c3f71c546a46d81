use telebridge_link::{LinkError, LinkState};

/// Errors surfaced by the command relay and bridge.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The command type is not whitelisted; nothing was written.
    #[error("invalid command type: {0}")]
    InvalidCommand(String),

    /// The link was not ready when the write was attempted.
    #[error("serial link not ready (state: {state})")]
    LinkNotReady { state: LinkState },

    /// The device failed during the write; the link is now faulted.
    #[error("serial link fault: {0}")]
    LinkFault(String),

    /// Any other link error.
    #[error("link error: {0}")]
    Link(#[source] LinkError),

    /// Audit storage failure.
    #[error("audit error: {0}")]
    Audit(#[from] telebridge_audit::AuditError),

    /// Bus failure.
    #[error("bus error: {0}")]
    Hub(#[from] telebridge_hub::HubError),
}

impl RelayError {
    /// HTTP-equivalent status: 422 for validation failures, 500 otherwise.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidCommand(_) => 422,
            _ => 500,
        }
    }
}

impl From<LinkError> for RelayError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::NotReady { state } => RelayError::LinkNotReady { state },
            LinkError::Fault(reason) => RelayError::LinkFault(reason),
            other => RelayError::Link(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_errors_map_to_taxonomy() {
        let err = RelayError::from(LinkError::NotReady {
            state: LinkState::Faulted,
        });
        assert!(matches!(err, RelayError::LinkNotReady { state: LinkState::Faulted }));
        assert_eq!(err.status_code(), 500);

        let err = RelayError::from(LinkError::Fault("gone".into()));
        assert!(matches!(err, RelayError::LinkFault(_)));

        let err = RelayError::from(LinkError::WriteTimeout {
            after: std::time::Duration::from_millis(100),
        });
        assert!(matches!(err, RelayError::Link(LinkError::WriteTimeout { .. })));
        assert_eq!(err.status_code(), 500);
        assert_eq!(RelayError::InvalidCommand("dance".into()).status_code(), 422);
    }
}
