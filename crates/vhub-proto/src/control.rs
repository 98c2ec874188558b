//! Client-to-server control frames.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A request sent by a client over its WebSocket.
///
/// ```text
/// {"type":"subscribe","topic":"event:42"}
/// {"type":"unsubscribe","topic":"event:42"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Join a topic.
    Subscribe { topic: String },
    /// Leave a topic.
    Unsubscribe { topic: String },
}

impl ControlFrame {
    /// Parse a control frame from a text message.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Error::Decode)
    }

    /// The topic this frame refers to.
    pub fn topic(&self) -> &str {
        match self {
            ControlFrame::Subscribe { topic } | ControlFrame::Unsubscribe { topic } => topic,
        }
    }

    /// Encode the frame as JSON text.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Encode)
    }
}
