//! Background side of a service: one supervised connection, the outbox
//! relay, and a consumer feeding the inbox plus the processor draining it.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::config::MessagingConfig;
use crate::connection::ConnectionSupervisor;
use crate::consumer::{Consumer, ConsumerConfig};
use crate::error::MessagingError;
use crate::inbox::{InboundHandler, Inbox, InboxStore};
use crate::outbox::{OutboxRelay, OutboxStore};
use crate::registry::Registry;
use crate::topology::Topology;

/// Queue a service consumes and the business callback for its records.
pub struct Subscription {
    pub consumer: ConsumerConfig,
    pub handler: Arc<dyn InboundHandler>,
}

pub struct MessagingRuntime {
    registry: Arc<Registry>,
    inbox: Inbox,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MessagingRuntime {
    /// Connect, declare `topology` and spawn the consumer, relay and inbox
    /// processor. Everything stops when `shutdown` is cancelled or
    /// [`close`](Self::close) is called.
    pub async fn start(
        broker: Arc<dyn Broker>,
        config: &MessagingConfig,
        topology: &Topology,
        outbox: Arc<dyn OutboxStore>,
        inbox: Arc<dyn InboxStore>,
        subscription: Subscription,
        shutdown: &CancellationToken,
    ) -> Result<Self, MessagingError> {
        let supervisor = ConnectionSupervisor::new(broker, config.connection());
        supervisor.connect().await?;

        let registry = Arc::new(Registry::new(supervisor));
        registry.declare(topology).await?;

        let cancel = shutdown.child_token();
        let inbox = Inbox::new(inbox, config.inbox());
        let queue = subscription.consumer.queue_name.clone();
        let consumer = Consumer::new(
            registry.channels(),
            subscription.consumer,
            Arc::new(inbox.writer(&queue)),
            &cancel,
        );
        registry.register_consumer(&queue, Arc::new(consumer));

        let mut tasks = registry.start_all();
        let relay = OutboxRelay::new(outbox, registry.clone(), config.relay());
        tasks.push(tokio::spawn(relay.run(cancel.clone())));
        let processor = inbox.on_inbound(&queue, subscription.handler);
        tasks.push(tokio::spawn(processor.run(cancel.clone())));

        tracing::info!(%queue, "messaging runtime started");
        Ok(Self {
            registry,
            inbox,
            cancel,
            tasks,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub async fn is_ready(&self) -> bool {
        self.registry.supervisor().is_connected().await
    }

    /// Stop the background tasks, wait for them, then close the connection.
    pub async fn close(self) -> Result<(), MessagingError> {
        self.cancel.cancel();
        self.registry.stop_all();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "messaging task ended abnormally");
            }
        }
        let result = self.registry.close().await;
        tracing::info!("messaging runtime closed");
        result
    }
}
