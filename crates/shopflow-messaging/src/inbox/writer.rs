use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::consumer::DeliveryHandler;
use crate::envelope::Envelope;
use crate::error::MessagingError;
use crate::inbox::store::InboxStore;

/// Message id for deliveries that arrive without one: stable for identical
/// bodies, so a redelivery still deduplicates.
pub fn derived_message_id(body: &[u8]) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, body).to_string()
}

/// Stores every delivery from one queue into the inbox. The delivery is
/// acknowledged once the row exists, whether or not it was new.
pub struct InboxWriter {
    store: Arc<dyn InboxStore>,
    queue: String,
}

impl InboxWriter {
    pub fn new(store: Arc<dyn InboxStore>, queue: &str) -> Self {
        Self {
            store,
            queue: queue.to_owned(),
        }
    }
}

#[async_trait]
impl DeliveryHandler for InboxWriter {
    async fn handle(&self, envelope: &Envelope) -> Result<(), MessagingError> {
        let message_id = match envelope.message_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => derived_message_id(&envelope.body),
        };

        let inserted = self
            .store
            .save(&message_id, &self.queue, &envelope.body)
            .await?;
        if inserted {
            tracing::debug!(%message_id, queue = %self.queue, "inbox message saved");
        } else {
            tracing::debug!(%message_id, queue = %self.queue, "duplicate delivery absorbed");
        }
        Ok(())
    }
}
