//! Messaging backbone configuration types.

use serde::Deserialize;

/// Default broker address (host:port).
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";
/// Prefix for consumer group ids; the full id is `{prefix}-{topic}`.
pub const DEFAULT_CONSUMER_GROUP_PREFIX: &str = "consumer-group";
/// Producer-side delivery timeout handed to the broker client.
pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 5000;

/// Encoding of message values on the wire. Messages carry no key.
///
/// Words travel as raw strings; there is no payload schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Plain UTF-8 text.
    #[default]
    Utf8,
}

impl PayloadEncoding {
    /// Identifier used in logs and client configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadEncoding::Utf8 => "utf8",
        }
    }

    /// Encode a value for transmission.
    pub fn encode<'a>(&self, value: &'a str) -> &'a [u8] {
        match self {
            PayloadEncoding::Utf8 => value.as_bytes(),
        }
    }

    /// Decode a received payload.
    pub fn decode<'a>(&self, payload: &'a [u8]) -> Result<&'a str, std::str::Utf8Error> {
        match self {
            PayloadEncoding::Utf8 => std::str::from_utf8(payload),
        }
    }
}

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Broker bootstrap servers (comma-separated host:port).
    pub bootstrap_servers: String,
    /// Prefix for consumer group ids.
    pub consumer_group_prefix: String,
    /// Value serializer.
    pub value_encoding: PayloadEncoding,
    /// Producer message timeout in milliseconds.
    pub message_timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: DEFAULT_BOOTSTRAP_SERVERS.to_string(),
            consumer_group_prefix: DEFAULT_CONSUMER_GROUP_PREFIX.to_string(),
            value_encoding: PayloadEncoding::Utf8,
            message_timeout_ms: DEFAULT_MESSAGE_TIMEOUT_MS,
        }
    }
}

impl MessagingConfig {
    /// Consumer group id for a topic.
    ///
    /// Deterministic, so a restarted consumer resumes from the group's
    /// committed offsets.
    pub fn consumer_group_for(&self, topic: &str) -> String {
        format!("{}-{}", self.consumer_group_prefix, topic)
    }
}
