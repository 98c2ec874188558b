//! Server-to-client message envelope.
//!
//! The envelope is the only shape the hub guarantees on the wire:
//!
//! ```text
//! {"type":"update","topic":"<topic>","payload":<opaque>}
//! ```
//!
//! The payload is whatever the publisher serialized; the hub never inspects it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of message carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// A domain event published to a topic.
    Update,
}

/// Borrowed envelope used on the publish path.
///
/// Borrowing keeps `publish` from cloning the payload before it is encoded.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: ?Sized> {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub topic: &'a str,
    pub payload: &'a T,
}

impl<'a, T: Serialize + ?Sized> Envelope<'a, T> {
    /// Create an `update` envelope.
    pub fn update(topic: &'a str, payload: &'a T) -> Self {
        Self {
            kind: EnvelopeKind::Update,
            topic,
            payload,
        }
    }

    /// Encode the envelope into a single JSON text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Encode)
    }
}

/// Owned envelope, as decoded by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub topic: String,
    pub payload: serde_json::Value,
}

impl OwnedEnvelope {
    /// Decode an envelope from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Error::Decode)
    }
}
