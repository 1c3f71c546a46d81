//! Bridge assembly: command relay, reader pump, and supervisor.
//!
//! Data flows device -> [`Pump`] -> hub; commands flow caller ->
//! [`CommandRelay`] -> link -> device. Every command attempt, device
//! record, and link transition lands in the audit trail and is broadcast
//! as a `log` message through [`AuditTrail`].

pub mod bridge;
pub mod error;
pub mod ingress;
pub mod observer;
pub mod pump;
pub mod relay;
pub mod trail;

pub use bridge::{Bridge, BridgeConfig, ReopenPolicy, MEMORY_AUDIT_PATH};
pub use error::{RelayError, Result};
pub use ingress::CommandIngress;
pub use observer::AuditObserver;
pub use pump::{Pump, PumpExit};
pub use relay::{Ack, CommandRelay};
pub use trail::{AuditTrail, SOURCE_API, SOURCE_SERIAL};
