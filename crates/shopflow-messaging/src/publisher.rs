use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::broker::PublishFlags;
use crate::connection::ChannelProvider;
use crate::envelope::{Envelope, ExchangeKind, Headers};
use crate::error::MessagingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
}

impl PublisherConfig {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            mandatory: false,
            immediate: false,
        }
    }

    fn flags(&self) -> PublishFlags {
        PublishFlags {
            mandatory: self.mandatory,
            immediate: self.immediate,
        }
    }
}

/// Sends persistent JSON messages to one exchange with one routing key,
/// over whatever channel the provider currently holds.
pub struct Publisher {
    channels: Arc<dyn ChannelProvider>,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(channels: Arc<dyn ChannelProvider>, config: PublisherConfig) -> Self {
        Self { channels, config }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Serialize `payload` as JSON and send it under a fresh message id,
    /// which is returned.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> Result<String, MessagingError> {
        let body = serde_json::to_vec(payload)?;
        self.publish_raw(body, None).await
    }

    pub async fn publish_raw(
        &self,
        body: Vec<u8>,
        headers: Option<Headers>,
    ) -> Result<String, MessagingError> {
        let message_id = Uuid::new_v4().to_string();
        self.publish_with_id(&message_id, body, headers).await?;
        Ok(message_id)
    }

    /// Send with a caller-chosen message id. The outbox relay uses this so
    /// that every retry of a record carries the same id.
    pub async fn publish_with_id(
        &self,
        message_id: &str,
        body: Vec<u8>,
        headers: Option<Headers>,
    ) -> Result<(), MessagingError> {
        let channel = self.channels.channel().await?;
        let envelope = Envelope::json(message_id, body, headers.unwrap_or_default());
        channel
            .publish(
                &self.config.exchange,
                &self.config.routing_key,
                self.config.flags(),
                envelope,
            )
            .await?;

        tracing::debug!(
            exchange = %self.config.exchange,
            routing_key = %self.config.routing_key,
            message_id,
            "message published"
        );
        Ok(())
    }

    pub async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), MessagingError> {
        let channel = self.channels.channel().await?;
        channel.declare_exchange(name, kind, durable).await
    }

    pub async fn declare_queue(
        &self,
        name: &str,
        durable: bool,
        auto_delete: bool,
    ) -> Result<(), MessagingError> {
        let channel = self.channels.channel().await?;
        channel.declare_queue(name, durable, auto_delete).await
    }

    /// Bind `queue` to this publisher's exchange.
    pub async fn bind_queue(&self, queue: &str, routing_key: &str) -> Result<(), MessagingError> {
        let channel = self.channels.channel().await?;
        channel
            .bind_queue(queue, &self.config.exchange, routing_key)
            .await
    }
}
