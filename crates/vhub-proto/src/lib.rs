//! vhub protocol types.
//!
//! This crate defines the wire contract between the notification hub and its
//! WebSocket clients. Everything on the wire is a JSON text frame.
//!
//! # Modules
//!
//! - [`envelope`] - Server-to-client message wrapper around opaque payloads
//! - [`control`] - Client-to-server subscribe/unsubscribe requests
//! - [`topic`] - Topic naming helpers used by publishers
//! - [`error`] - Protocol error types
//!
//! # Example
//!
//! ```
//! use vhub_proto::{Envelope, topic};
//!
//! let topic = topic::event(42);
//! let frame = Envelope::update(&topic, &serde_json::json!({"id": 7})).encode().unwrap();
//! assert_eq!(frame, r#"{"type":"update","topic":"event:42","payload":{"id":7}}"#);
//! ```

pub mod control;
pub mod envelope;
pub mod error;
pub mod topic;

pub use control::ControlFrame;
pub use envelope::{Envelope, EnvelopeKind, OwnedEnvelope};
pub use error::Error;
pub use topic::TopicScope;
