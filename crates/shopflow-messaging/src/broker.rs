//! Capability interface over a message broker.
//!
//! Publishers and consumers never see a concrete client. They borrow a
//! [`BrokerChannel`] through a [`ChannelProvider`](crate::connection::ChannelProvider),
//! which lets tests swap the AMQP transport for [`MemoryBroker`](crate::memory::MemoryBroker).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::envelope::{Envelope, ExchangeKind};
use crate::error::MessagingError;

pub type DeliveryStream = BoxStream<'static, Result<Delivery, MessagingError>>;

/// Opens connections to a broker at a URL.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn BrokerConnection>, MessagingError>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, MessagingError>;

    /// Resolves with a reason once the connection is lost or closed.
    /// Only the first call is guaranteed to observe the notification.
    fn on_disconnect(&self) -> BoxFuture<'static, String>;

    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<(), MessagingError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishFlags {
    pub mandatory: bool,
    pub immediate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeOptions {
    pub consumer_tag: String,
    pub auto_ack: bool,
    pub exclusive: bool,
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), MessagingError>;

    async fn declare_queue(
        &self,
        name: &str,
        durable: bool,
        auto_delete: bool,
    ) -> Result<(), MessagingError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        flags: PublishFlags,
        envelope: Envelope,
    ) -> Result<(), MessagingError>;

    /// Limit unacknowledged deliveries held by consumers on this channel.
    async fn qos(&self, prefetch_count: u16) -> Result<(), MessagingError>;

    async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, MessagingError>;

    async fn close(&self) -> Result<(), MessagingError>;
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<(), MessagingError>;
    async fn nack(&self, requeue: bool) -> Result<(), MessagingError>;
}

/// A message received from a queue, together with the handle that settles it.
pub struct Delivery {
    pub envelope: Envelope,
    pub redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(envelope: Envelope, redelivered: bool, acker: Box<dyn Acker>) -> Self {
        Self {
            envelope,
            redelivered,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<(), MessagingError> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<(), MessagingError> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.envelope.message_id)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}
