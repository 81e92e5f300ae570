//! Connection supervision.
//!
//! [`ConnectionSupervisor`] owns the single broker connection and channel of
//! a process, watches for disconnects and reconnects within a bounded budget.
//! Publishers and consumers only ever ask it for the current channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::broker::{Broker, BrokerChannel, BrokerConnection};
use crate::error::MessagingError;

pub const DEFAULT_MAX_RECONNECTS: u32 = 10;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: String,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    ShuttingDown,
}

/// Source of the channel publishers and consumers operate on.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn channel(&self) -> Result<Arc<dyn BrokerChannel>, MessagingError>;
}

#[derive(Default)]
struct Slot {
    connection: Option<Arc<dyn BrokerConnection>>,
    channel: Option<Arc<dyn BrokerChannel>>,
    shutting_down: bool,
    reconnect_count: u32,
    generation: u64,
}

struct Inner {
    broker: Arc<dyn Broker>,
    config: ConnectionConfig,
    slot: RwLock<Slot>,
}

#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
}

impl ConnectionSupervisor {
    pub fn new(broker: Arc<dyn Broker>, config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                broker,
                config,
                slot: RwLock::new(Slot::default()),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Open a connection and channel, then start watching for disconnects.
    /// A successful connect resets the reconnect counter and releases any
    /// pair it replaces. The lock is not held during the handshake, so
    /// `channel()` keeps answering `NotConnected` meanwhile.
    pub async fn connect(&self) -> Result<(), MessagingError> {
        let started = {
            let slot = self.inner.slot.read().await;
            if slot.shutting_down {
                return Err(MessagingError::ShuttingDown);
            }
            slot.generation
        };

        let connection = self.inner.broker.connect(&self.inner.config.url).await?;
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(err) => {
                let _ = connection.close().await;
                return Err(MessagingError::ConnectFailure(err.to_string()));
            }
        };
        let notice = connection.on_disconnect();

        let mut slot = self.inner.slot.write().await;
        if slot.shutting_down || slot.generation != started {
            let shutting_down = slot.shutting_down;
            drop(slot);
            release(Some(channel), Some(connection)).await;
            if shutting_down {
                return Err(MessagingError::ShuttingDown);
            }
            tracing::debug!("concurrent connect won, discarded extra connection");
            return Ok(());
        }

        let previous_channel = slot.channel.replace(channel);
        let previous_connection = slot.connection.replace(connection);
        slot.reconnect_count = 0;
        slot.generation += 1;
        let generation = slot.generation;
        drop(slot);

        release(previous_channel, previous_connection).await;
        tracing::info!(generation, "connected to broker");
        tokio::spawn(self.clone().watch(generation, notice));
        Ok(())
    }

    /// Wait for the disconnect notice of one connection generation and
    /// recover from it.
    fn watch(self, generation: u64, notice: BoxFuture<'static, String>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let reason = notice.await;
            {
                let mut slot = self.inner.slot.write().await;
                if slot.generation != generation {
                    return;
                }
                slot.channel = None;
                slot.connection = None;
                if slot.shutting_down {
                    return;
                }
            }
            tracing::warn!(reason = %reason, "broker connection lost");
            self.reconnect().await;
        })
    }

    async fn reconnect(&self) {
        let max = self.inner.config.max_reconnects;
        loop {
            let attempt = {
                let mut slot = self.inner.slot.write().await;
                if slot.shutting_down {
                    return;
                }
                if slot.reconnect_count >= max {
                    tracing::error!(
                        attempts = slot.reconnect_count,
                        "reconnect budget exhausted, giving up"
                    );
                    return;
                }
                slot.reconnect_count += 1;
                slot.reconnect_count
            };

            tracing::info!(
                attempt,
                max,
                delay = ?self.inner.config.reconnect_delay,
                "reconnecting to broker"
            );
            tokio::time::sleep(self.inner.config.reconnect_delay).await;

            match self.connect().await {
                Ok(()) => {
                    tracing::info!(attempt, "reconnected to broker");
                    return;
                }
                Err(MessagingError::ShuttingDown) => return,
                Err(err) => tracing::warn!(attempt, error = %err, "reconnect attempt failed"),
            }
        }
    }

    /// Release the channel and connection. Idempotent; no reconnect is
    /// attempted afterwards.
    pub async fn close(&self) -> Result<(), MessagingError> {
        let (channel, connection) = {
            let mut slot = self.inner.slot.write().await;
            slot.shutting_down = true;
            (slot.channel.take(), slot.connection.take())
        };

        if let Some(channel) = channel {
            if let Err(err) = channel.close().await {
                tracing::debug!(error = %err, "closing channel failed");
            }
        }
        if let Some(connection) = connection {
            connection.close().await?;
            tracing::info!("broker connection closed");
        }
        Ok(())
    }

    pub async fn state(&self) -> ConnectionState {
        let slot = self.inner.slot.read().await;
        if slot.shutting_down {
            ConnectionState::ShuttingDown
        } else if slot.channel.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub async fn is_connected(&self) -> bool {
        let slot = self.inner.slot.read().await;
        !slot.shutting_down
            && slot.channel.is_some()
            && slot.connection.as_ref().is_some_and(|c| c.is_open())
    }

    /// Attempts made since the last successful connect.
    pub async fn reconnect_count(&self) -> u32 {
        self.inner.slot.read().await.reconnect_count
    }
}

#[async_trait]
impl ChannelProvider for ConnectionSupervisor {
    async fn channel(&self) -> Result<Arc<dyn BrokerChannel>, MessagingError> {
        let slot = self.inner.slot.read().await;
        slot.channel.clone().ok_or(MessagingError::NotConnected)
    }
}

/// Close a channel and connection that are no longer installed.
async fn release(
    channel: Option<Arc<dyn BrokerChannel>>,
    connection: Option<Arc<dyn BrokerConnection>>,
) {
    if let Some(channel) = channel {
        if let Err(err) = channel.close().await {
            tracing::debug!(error = %err, "closing stale channel failed");
        }
    }
    if let Some(connection) = connection {
        if let Err(err) = connection.close().await {
            tracing::warn!(error = %err, "closing stale connection failed");
        }
    }
}
