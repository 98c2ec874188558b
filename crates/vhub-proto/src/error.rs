//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum Error {
    /// The envelope (or its payload) could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// A frame received from a client was not valid JSON for the expected type.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
