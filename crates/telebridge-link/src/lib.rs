//! Serial link manager.
//!
//! [`LinkManager`] is the only owner of the device handle. It runs the
//! `Closed -> Opening -> Ready -> Faulted` state machine, hands the read
//! half to the caller as a [`LinkSession`], and serializes every outbound
//! line behind one mutex so concurrent writers never interleave on the
//! wire. Each transition is reported to an optional [`LinkObserver`].

pub mod error;
pub mod manager;
pub mod opener;
pub mod state;
pub mod stream;

pub use error::{LinkError, Result};
pub use manager::{LinkManager, LinkObserver, LinkSession};
pub use opener::{DeviceEndpoint, DeviceOpener, SerialConfig, SystemOpener, DEFAULT_BAUD};
pub use state::LinkState;
pub use stream::LinkStream;
