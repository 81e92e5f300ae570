//! Queue consumer loop with per-message timeout and ack/nack settlement.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::broker::{ConsumeOptions, Delivery};
use crate::connection::ChannelProvider;
use crate::envelope::Envelope;
use crate::error::MessagingError;

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub queue_name: String,
    pub consumer_tag: String,
    pub auto_ack: bool,
    pub exclusive: bool,
    /// Zero leaves the broker default in place.
    pub prefetch_count: u16,
}

impl ConsumerConfig {
    pub fn new(queue_name: impl Into<String>, consumer_tag: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            consumer_tag: consumer_tag.into(),
            auto_ack: false,
            exclusive: false,
            prefetch_count: 0,
        }
    }

    pub fn with_prefetch(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }
}

/// Processes one delivered message. `Ok` acknowledges it, `Err` sends it
/// back to the queue.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<(), MessagingError>;
}

/// Adapts an async closure into a [`DeliveryHandler`].
pub struct HandlerFn<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MessagingError>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> DeliveryHandler for HandlerFn<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MessagingError>> + Send + 'static,
{
    async fn handle(&self, envelope: &Envelope) -> Result<(), MessagingError> {
        (self.0)(envelope.clone()).await
    }
}

pub struct Consumer {
    channels: Arc<dyn ChannelProvider>,
    config: ConsumerConfig,
    handler: Arc<dyn DeliveryHandler>,
    cancel: CancellationToken,
    handler_timeout: Duration,
    retry_delay: Duration,
}

impl Consumer {
    /// The consumer stops when `shutdown` is cancelled or when
    /// [`stop`](Self::stop) is called, whichever comes first.
    pub fn new(
        channels: Arc<dyn ChannelProvider>,
        config: ConsumerConfig,
        handler: Arc<dyn DeliveryHandler>,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            channels,
            config,
            handler,
            cancel: shutdown.child_token(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Consume until stopped. Channel errors and closed streams restart the
    /// subscription after the retry delay.
    pub async fn start(&self) {
        let queue = self.config.queue_name.as_str();
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.consume().await {
                Ok(()) => break,
                Err(err) => {
                    tracing::warn!(
                        queue,
                        error = %err,
                        retry_in = ?self.retry_delay,
                        "consumer interrupted, resubscribing"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
        tracing::info!(queue, "consumer stopped");
    }

    /// One subscription. `Ok` means the consumer was stopped.
    async fn consume(&self) -> Result<(), MessagingError> {
        let channel = self.channels.channel().await?;
        if self.config.prefetch_count > 0 {
            channel.qos(self.config.prefetch_count).await?;
        }
        let options = ConsumeOptions {
            consumer_tag: self.config.consumer_tag.clone(),
            auto_ack: self.config.auto_ack,
            exclusive: self.config.exclusive,
        };
        let mut deliveries = channel.consume(&self.config.queue_name, options).await?;
        tracing::info!(
            queue = %self.config.queue_name,
            tag = %self.config.consumer_tag,
            "consuming"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => self.dispatch(delivery).await,
                    Some(Err(err)) => return Err(err),
                    None => return Err(MessagingError::StreamClosed),
                },
            }
        }
    }

    async fn dispatch(&self, delivery: Delivery) {
        let message_id = delivery.envelope.message_id.clone().unwrap_or_default();
        let handled = self.handler.handle(&delivery.envelope);
        let outcome = match tokio::time::timeout(self.handler_timeout, handled).await {
            Ok(result) => result,
            Err(_) => Err(MessagingError::HandlerTimeout(self.handler_timeout)),
        };

        if self.config.auto_ack {
            if let Err(err) = outcome {
                tracing::warn!(%message_id, error = %err, "handler failed on auto-ack delivery");
            }
            return;
        }

        match outcome {
            Ok(()) => {
                if let Err(err) = delivery.ack().await {
                    tracing::warn!(%message_id, error = %err, "ack failed");
                }
            }
            Err(err) => {
                tracing::warn!(
                    %message_id,
                    redelivered = delivery.redelivered,
                    error = %err,
                    "handler failed, requeueing"
                );
                if let Err(err) = delivery.nack(true).await {
                    tracing::warn!(%message_id, error = %err, "nack failed");
                }
            }
        }
    }
}
