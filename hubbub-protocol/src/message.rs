//! Command message model shared by all wire encodings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ProtocolError;

/// Wire encodings a connection can negotiate.
///
/// The handshake digit is the single-byte payload of the first frame a
/// client sends; the tag string is what encoded commands carry in their
/// `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Json,
    Xml,
    Binary,
}

impl WireFormat {
    /// Maps a handshake frame payload to a wire format.
    pub fn from_handshake(payload: &[u8]) -> Result<Self, ProtocolError> {
        match payload {
            b"0" => Ok(WireFormat::Json),
            b"1" => Ok(WireFormat::Xml),
            b"2" => Ok(WireFormat::Binary),
            other => Err(ProtocolError::InvalidHandshake(other.to_vec())),
        }
    }

    /// The single-byte payload announcing this format at handshake.
    pub fn handshake_payload(&self) -> &'static [u8] {
        match self {
            WireFormat::Json => b"0",
            WireFormat::Xml => b"1",
            WireFormat::Binary => b"2",
        }
    }

    /// Tag string carried in the `type` field of encoded commands.
    pub fn tag(&self) -> &'static str {
        match self {
            WireFormat::Json => "json",
            WireFormat::Xml => "xml",
            WireFormat::Binary => "binary",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Wire tags for the `command` field.
pub mod command {
    pub const PUBLISH: &str = "pub";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const LIST_ALL: &str = "listall";
    pub const SUBSCRIPTIONS: &str = "subs";
}

/// One subscription in a [`Message::Subscriptions`] reply: a topic pattern
/// and the broker-assigned id of the subscribed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub topic: String,
    pub conn: u64,
}

/// Logical commands exchanged between clients and the broker.
///
/// `Publish` flows both directions: clients publish values, and the broker
/// reuses the same command to deliver values to subscribers (including the
/// retained-value snapshot sent on subscribe). `Subscriptions` is the
/// broker's reply to `ListAll`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Append `value` to `topic` and fan it out to matching subscribers.
    Publish { topic: String, value: Value },
    /// Register the connection under the topic pattern `topic`.
    Subscribe { topic: String },
    /// Drop the connection's registration under `topic`.
    Unsubscribe { topic: String },
    /// Request the full subscription list.
    ListAll,
    /// Reply to `ListAll`.
    Subscriptions { entries: Vec<SubscriptionEntry> },
}

impl Message {
    pub fn publish(topic: impl Into<String>, value: Value) -> Self {
        Message::Publish {
            topic: topic.into(),
            value,
        }
    }

    pub fn subscribe(topic: impl Into<String>) -> Self {
        Message::Subscribe {
            topic: topic.into(),
        }
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Message::Unsubscribe {
            topic: topic.into(),
        }
    }

    /// Wire tag for this command.
    pub fn command_tag(&self) -> &'static str {
        match self {
            Message::Publish { .. } => command::PUBLISH,
            Message::Subscribe { .. } => command::SUBSCRIBE,
            Message::Unsubscribe { .. } => command::UNSUBSCRIBE,
            Message::ListAll => command::LIST_ALL,
            Message::Subscriptions { .. } => command::SUBSCRIPTIONS,
        }
    }
}
