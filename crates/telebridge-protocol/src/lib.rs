//! Device line decoding, unit normalization, and bus message shapes.
//!
//! The device emits one record per line: JSON objects discriminated by a
//! `type` field (`telemetry`, `ack`, `event`) or free text. [`Decoder`]
//! runs an ordered list of [`DecodeStrategy`] implementations over each
//! line and never fails; anything unmatched comes back as
//! [`Decoded::Unrecognized`].
//!
//! Outbound, operator commands are validated against a fixed whitelist
//! ([`CommandKind`]) and serialized to one JSON line each.

pub mod audit;
pub mod command;
pub mod decoder;
pub mod error;
pub mod event;
pub mod message;
pub mod telemetry;

pub use audit::{AuditEntry, AuditLevel, AuditRecord};
pub use command::{CommandKind, CommandRequest, COMMAND_WHITELIST};
pub use decoder::{
    DecodeStrategy, Decoded, Decoder, LegacyDistanceStrategy, StructuredStrategy,
};
pub use error::{ProtocolError, Result};
pub use event::{DeviceEvent, EventKind};
pub use message::{BusMessage, ClientMessage, CommandResult};
pub use telemetry::{distance_mm_to_cm, now_millis, pulse_us_to_angle, TelemetrySample};
