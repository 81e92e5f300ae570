use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::MessagingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxRecord {
    pub id: Uuid,
    pub message_id: String,
    pub queue: String,
    pub payload: Vec<u8>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Failed handler invocations so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set once the record is taken out of the drain path.
    pub quarantined_at: Option<DateTime<Utc>>,
}

impl InboxRecord {
    pub fn new(message_id: &str, queue: &str, payload: &[u8], created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_id: message_id.to_owned(),
            queue: queue.to_owned(),
            payload: payload.to_vec(),
            processed: false,
            processed_at: None,
            created_at,
            attempts: 0,
            last_error: None,
            quarantined_at: None,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MessagingError> {
        serde_json::from_slice(&self.payload).map_err(MessagingError::decode)
    }

    pub fn is_pending(&self) -> bool {
        !self.processed && self.quarantined_at.is_none()
    }
}
