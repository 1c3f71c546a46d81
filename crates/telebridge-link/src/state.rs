use std::fmt;

/// Lifecycle of the single device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    #[default]
    Closed,
    Opening,
    Ready,
    Faulted,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Closed => "closed",
            LinkState::Opening => "opening",
            LinkState::Ready => "ready",
            LinkState::Faulted => "faulted",
        }
    }

    /// Only a ready link accepts writes.
    pub fn is_ready(self) -> bool {
        self == LinkState::Ready
    }

    /// States from which an explicit `open` is allowed.
    pub fn can_open(self) -> bool {
        matches!(self, LinkState::Closed | LinkState::Faulted)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
