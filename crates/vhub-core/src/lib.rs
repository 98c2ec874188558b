//! vhub notification hub.
//!
//! This crate provides the in-process hub that fans out domain events to
//! long-lived client connections, including the connection registry, the
//! topic index, backpressure eviction and the per-connection pumps.

pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod notify;
pub mod session;
mod topic;

pub use config::{HubConfig, PumpConfig};
pub use connection::{Connection, ConnectionId, ConnectionState, Frame, UserId};
pub use error::{HubError, Result};
pub use hub::{Admission, EvictReason, Hub, HubRunner, HubStats, PublishReport};
pub use notify::{Signup, SignupNotifier, SignupStatus};
pub use session::{Inbound, Outbound};
