//! Serial telemetry and command bridge.
//!
//! telebridge owns one serial-attached controller, decodes its
//! line-oriented protocol, fans telemetry out to WebSocket subscribers,
//! relays whitelisted operator commands back down the link, and records
//! every event in an audit trail.
//!
//! # Crate Structure
//!
//! - [`frame`]: Newline framing of the device byte stream
//! - [`protocol`]: Decoder, unit normalization, wire shapes, command whitelist
//! - [`link`]: Serial link state machine and guarded writes
//! - [`hub`]: Broadcast hub, WebSocket bus server and client
//! - [`audit`]: Audit sink contract, SQLite and in-memory sinks
//! - [`relay`]: Command relay, reader pump, bridge supervisor

/// Re-export frame types.
pub mod frame {
    pub use telebridge_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use telebridge_protocol::*;
}

/// Re-export link types.
pub mod link {
    pub use telebridge_link::*;
}

/// Re-export hub and bus types.
pub mod hub {
    pub use telebridge_hub::*;
}

/// Re-export audit types.
pub mod audit {
    pub use telebridge_audit::*;
}

/// Re-export relay and bridge types.
pub mod relay {
    pub use telebridge_relay::*;
}
