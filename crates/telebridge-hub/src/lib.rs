//! Broadcast hub and WebSocket message bus.
//!
//! [`Hub`] fans pre-serialized messages out to every open subscriber
//! through bounded per-subscriber queues. A full queue drops the newest
//! message for that subscriber only; a closed or vanished subscriber is
//! skipped. Publishing never blocks and never fails.
//!
//! [`BusServer`] exposes the hub over WebSocket, one thread per
//! connection, and routes inbound text to an optional
//! [`IngressHandler`]. [`BusClient`] and [`ReconnectPolicy`] cover the
//! subscriber side.

pub mod client;
pub mod error;
pub mod hub;
pub mod reconnect;
pub mod server;

pub use client::{bus_url, BusClient};
pub use error::{HubError, Result};
pub use hub::{Hub, HubConfig, PublishReport, SubscriberId, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use server::{BusServer, BusServerHandle, IngressHandler, DEFAULT_BUS_PORT};
