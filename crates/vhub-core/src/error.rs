//! Hub error types.

use thiserror::Error;

/// Errors surfaced to callers of the hub.
///
/// Connection faults and backpressure are deliberately absent: they are
/// resolved inside the hub by evicting the affected connection.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub has begun shutting down.
    #[error("hub stopped")]
    Stopped,

    /// The payload could not be serialized into an envelope.
    #[error(transparent)]
    Encode(#[from] vhub_proto::Error),
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
