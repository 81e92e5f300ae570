use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::envelope::Headers;
use crate::error::MessagingError;

/// Lifecycle of an outbox record.
///
/// `Pending` → `InFlight` when a relay claims it → `Sent`, or `Failed` with an
/// optional retry time, or `DeadLettered` once the retry budget is spent.
/// `Sent` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxStatus {
    Pending,
    InFlight,
    Sent,
    Failed,
    DeadLettered,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "dead_lettered" => Ok(Self::DeadLettered),
            other => Err(MessagingError::Store(anyhow::anyhow!(
                "unknown outbox status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub message_id: String,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: Option<Headers>,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Whether a relay tick at `now` may pick this record up.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Failed | OutboxStatus::InFlight => {
                self.next_attempt_at.is_some_and(|at| at <= now)
            }
            OutboxStatus::Sent | OutboxStatus::DeadLettered => false,
        }
    }
}

/// An outbox row about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxMessage {
    pub id: Uuid,
    pub message_id: String,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: Option<Headers>,
}

impl NewOutboxMessage {
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_id: Uuid::new_v4().to_string(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload,
            headers: None,
        }
    }

    pub fn json<T: Serialize + ?Sized>(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: &T,
    ) -> Result<Self, MessagingError> {
        Ok(Self::new(exchange, routing_key, serde_json::to_vec(payload)?))
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn into_record(self, created_at: DateTime<Utc>) -> OutboxRecord {
        OutboxRecord {
            id: self.id,
            message_id: self.message_id,
            exchange: self.exchange,
            routing_key: self.routing_key,
            payload: self.payload,
            headers: self.headers,
            status: OutboxStatus::Pending,
            created_at,
            sent_at: None,
            error: None,
            retry_count: 0,
            next_attempt_at: None,
        }
    }
}
