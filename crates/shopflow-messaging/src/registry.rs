use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use crate::connection::{ChannelProvider, ConnectionSupervisor};
use crate::consumer::Consumer;
use crate::error::MessagingError;
use crate::publisher::{Publisher, PublisherConfig};
use crate::topology::Topology;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Named publishers and consumers sharing one supervised connection.
pub struct Registry {
    supervisor: ConnectionSupervisor,
    channels: Arc<dyn ChannelProvider>,
    publishers: Mutex<HashMap<String, Arc<Publisher>>>,
    consumers: Mutex<HashMap<String, Arc<Consumer>>>,
}

impl Registry {
    pub fn new(supervisor: ConnectionSupervisor) -> Self {
        let channels: Arc<dyn ChannelProvider> = Arc::new(supervisor.clone());
        Self {
            supervisor,
            channels,
            publishers: Mutex::new(HashMap::new()),
            consumers: Mutex::new(HashMap::new()),
        }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Channel source to hand to consumers built outside the registry.
    pub fn channels(&self) -> Arc<dyn ChannelProvider> {
        self.channels.clone()
    }

    /// Cached publisher for `key`. The config is only used the first time a
    /// key is seen.
    pub fn get_or_create_publisher(&self, key: &str, config: PublisherConfig) -> Arc<Publisher> {
        let mut publishers = guard(&self.publishers);
        publishers
            .entry(key.to_owned())
            .or_insert_with(|| {
                tracing::debug!(key, exchange = %config.exchange, "publisher created");
                Arc::new(Publisher::new(self.channels.clone(), config))
            })
            .clone()
    }

    /// Publisher keyed by destination, as used by the outbox relay.
    pub fn publisher_for(&self, exchange: &str, routing_key: &str) -> Arc<Publisher> {
        self.get_or_create_publisher(
            &format!("{exchange}:{routing_key}"),
            PublisherConfig::new(exchange, routing_key),
        )
    }

    pub fn publisher_count(&self) -> usize {
        guard(&self.publishers).len()
    }

    /// Track a consumer under `key`. A consumer previously registered under
    /// the same key is stopped and replaced.
    pub fn register_consumer(&self, key: &str, consumer: Arc<Consumer>) {
        if let Some(previous) = guard(&self.consumers).insert(key.to_owned(), consumer) {
            tracing::warn!(key, "replacing registered consumer");
            previous.stop();
        }
    }

    pub fn consumer(&self, key: &str) -> Option<Arc<Consumer>> {
        guard(&self.consumers).get(key).cloned()
    }

    /// Spawn every registered consumer on the runtime.
    pub fn start_all(&self) -> Vec<JoinHandle<()>> {
        guard(&self.consumers)
            .values()
            .cloned()
            .map(|consumer| tokio::spawn(async move { consumer.start().await }))
            .collect()
    }

    /// Signal every consumer to stop. Does not wait for in-flight handlers.
    pub fn stop_all(&self) {
        for (key, consumer) in guard(&self.consumers).iter() {
            tracing::debug!(key = %key, "stopping consumer");
            consumer.stop();
        }
    }

    /// Declare exchanges, queues and bindings, in that order.
    pub async fn declare(&self, topology: &Topology) -> Result<(), MessagingError> {
        let channel = self.channels.channel().await?;
        for exchange in &topology.exchanges {
            channel
                .declare_exchange(&exchange.name, exchange.kind, exchange.durable)
                .await?;
        }
        for queue in &topology.queues {
            channel
                .declare_queue(&queue.name, queue.durable, queue.auto_delete)
                .await?;
        }
        for binding in &topology.bindings {
            channel
                .bind_queue(&binding.queue, &binding.exchange, &binding.routing_key)
                .await?;
        }
        tracing::info!(
            exchanges = topology.exchanges.len(),
            queues = topology.queues.len(),
            bindings = topology.bindings.len(),
            "topology declared"
        );
        Ok(())
    }

    pub async fn close(&self) -> Result<(), MessagingError> {
        self.stop_all();
        self.supervisor.close().await
    }
}
