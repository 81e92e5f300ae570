//! Wire-level message envelope, independent of the business payload.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::MessagingError;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Application headers attached to a message.
pub type Headers = BTreeMap<String, String>;

/// AMQP delivery mode. Persistent messages survive a broker restart when
/// routed to a durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Transient = 1,
    Persistent = 2,
}

impl DeliveryMode {
    pub fn from_amqp(raw: u8) -> Self {
        if raw == 2 {
            Self::Persistent
        } else {
            Self::Transient
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub content_type: String,
    pub body: Vec<u8>,
    /// Always set on outgoing messages. Inbound messages from foreign
    /// producers may lack one.
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub delivery_mode: DeliveryMode,
    pub headers: Headers,
}

impl Envelope {
    /// Persistent JSON envelope stamped with the current time.
    pub fn json(message_id: impl Into<String>, body: Vec<u8>, headers: Headers) -> Self {
        Self {
            content_type: CONTENT_TYPE_JSON.to_owned(),
            body,
            message_id: Some(message_id.into()),
            timestamp: Utc::now(),
            delivery_mode: DeliveryMode::Persistent,
            headers,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MessagingError> {
        serde_json::from_slice(&self.body).map_err(MessagingError::decode)
    }

    /// Timestamp as RFC 3339, the representation used in logs and headers.
    pub fn timestamp_rfc3339(&self) -> String {
        shopflow_core::serde::format_rfc3339_ms(&self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
            Self::Topic => "topic",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "fanout" => Ok(Self::Fanout),
            "topic" => Ok(Self::Topic),
            other => Err(MessagingError::Broker(format!(
                "unsupported exchange kind {other}"
            ))),
        }
    }
}
