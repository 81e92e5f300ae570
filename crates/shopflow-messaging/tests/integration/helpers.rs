use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use async_trait::async_trait;

use shopflow_messaging::broker::{Broker, BrokerConnection};
use shopflow_messaging::connection::{ConnectionConfig, ConnectionSupervisor};
use shopflow_messaging::consumer::{DeliveryHandler, handler_fn};
use shopflow_messaging::envelope::Envelope;
use shopflow_messaging::error::MessagingError;
use shopflow_messaging::memory::MemoryBroker;
use shopflow_messaging::outbox::{MemoryOutboxStore, NewOutboxMessage, OutboxRecord, OutboxStore};
use shopflow_messaging::registry::Registry;
use shopflow_messaging::topology::shop_topology;

pub const RECONNECT_DELAY: Duration = Duration::from_millis(200);

pub fn connection_config(max_reconnects: u32) -> ConnectionConfig {
    ConnectionConfig {
        url: "memory://test".to_owned(),
        max_reconnects,
        reconnect_delay: RECONNECT_DELAY,
    }
}

pub fn supervisor(broker: &MemoryBroker, max_reconnects: u32) -> ConnectionSupervisor {
    let broker: Arc<dyn Broker> = Arc::new(broker.clone());
    ConnectionSupervisor::new(broker, connection_config(max_reconnects))
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// Connected registry over an in-memory broker with the shop topology
/// declared.
pub struct Harness {
    pub broker: MemoryBroker,
    pub supervisor: ConnectionSupervisor,
    pub registry: Arc<Registry>,
}

impl Harness {
    pub async fn connected() -> Self {
        let harness = Self::disconnected();
        harness.supervisor.connect().await.unwrap();
        harness.registry.declare(&shop_topology()).await.unwrap();
        harness
    }

    /// Registry whose supervisor has not connected yet.
    pub fn disconnected() -> Self {
        let broker = MemoryBroker::new();
        let supervisor = supervisor(&broker, 10);
        let registry = Arc::new(Registry::new(supervisor.clone()));
        Self {
            broker,
            supervisor,
            registry,
        }
    }
}

// ── SlowBroker ───────────────────────────────────────────────────────────────

/// Broker whose handshake takes `delay` before delegating to a
/// [`MemoryBroker`].
#[derive(Clone)]
pub struct SlowBroker {
    pub inner: MemoryBroker,
    pub delay: Duration,
}

#[async_trait]
impl Broker for SlowBroker {
    async fn connect(&self, url: &str) -> Result<Arc<dyn BrokerConnection>, MessagingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.connect(url).await
    }
}

// ── BrokenOutboxStore ────────────────────────────────────────────────────────

/// Outbox that cannot record the sent state of one record.
pub struct BrokenOutboxStore {
    pub inner: MemoryOutboxStore,
    pub broken: Uuid,
}

#[async_trait]
impl OutboxStore for BrokenOutboxStore {
    async fn insert(&self, message: NewOutboxMessage) -> Result<OutboxRecord, MessagingError> {
        self.inner.insert(message).await
    }

    async fn claim_batch(
        &self,
        limit: u64,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<OutboxRecord>, MessagingError> {
        self.inner.claim_batch(limit, now, lease).await
    }

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), MessagingError> {
        if id == self.broken {
            return Err(MessagingError::Store(anyhow::anyhow!("connection reset")));
        }
        self.inner.mark_sent(id, sent_at).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), MessagingError> {
        self.inner.mark_failed(id, error, retry_at).await
    }

    async fn mark_dead_lettered(&self, id: Uuid, error: &str) -> Result<(), MessagingError> {
        self.inner.mark_dead_lettered(id, error).await
    }

    async fn readmit(&self, message_id: &str) -> Result<bool, MessagingError> {
        self.inner.readmit(message_id).await
    }

    async fn purge_sent(&self, before: DateTime<Utc>) -> Result<u64, MessagingError> {
        self.inner.purge_sent(before).await
    }

    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<OutboxRecord>, MessagingError> {
        self.inner.find_by_message_id(message_id).await
    }
}

// ── RecordingHandler ─────────────────────────────────────────────────────────

/// Delivery handler that records every message id it sees and then
/// succeeds or fails as configured.
pub fn recording_handler(fail: bool) -> (Arc<dyn DeliveryHandler>, Arc<Mutex<Vec<String>>>) {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
    let log = Arc::clone(&seen);
    let handler = handler_fn(move |envelope: Envelope| {
        let log = Arc::clone(&log);
        async move {
            let id = envelope.message_id.clone().unwrap_or_default();
            log.lock().unwrap().push(id);
            if fail {
                Err(MessagingError::handler("always failing"))
            } else {
                Ok(())
            }
        }
    });
    (Arc::new(handler), seen)
}

/// Poll `check` until it holds, failing the test after `limit`.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
