//! In-process broker with AMQP-like routing and acknowledgement semantics.
//!
//! Used by the test suites and by local runs without RabbitMQ. Supports
//! direct, fanout and topic exchanges, the default exchange, prefetch limits,
//! requeue on nack and requeue of unacknowledged deliveries when a
//! connection goes away. [`MemoryBroker::sever_connections`] and
//! [`MemoryBroker::set_reachable`] simulate outages.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::broker::{
    Acker, Broker, BrokerChannel, BrokerConnection, ConsumeOptions, Delivery, DeliveryStream,
    PublishFlags,
};
use crate::envelope::{Envelope, ExchangeKind};
use crate::error::MessagingError;

/// A message accepted by [`MemoryBroker`], recorded for inspection.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub envelope: Envelope,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

struct State {
    reachable: bool,
    exchanges: HashMap<String, ExchangeKind>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    connections: HashMap<u64, CancellationToken>,
    published: Vec<PublishedMessage>,
    next_connection: u64,
    next_tag: u64,
    connects: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            reachable: true,
            exchanges: HashMap::new(),
            queues: HashMap::new(),
            bindings: Vec::new(),
            connections: HashMap::new(),
            published: Vec::new(),
            next_connection: 0,
            next_tag: 0,
            connects: 0,
        }
    }
}

struct QueueState {
    ready: VecDeque<Queued>,
    unacked: HashMap<u64, Unacked>,
    notify: Arc<Notify>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

#[derive(Clone)]
struct Queued {
    envelope: Envelope,
    redelivered: bool,
}

struct Unacked {
    connection: u64,
    message: Queued,
    in_flight: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    queue: String,
    exchange: String,
    routing_key: String,
}

fn closed() -> MessagingError {
    MessagingError::Broker("channel closed".to_owned())
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// When unreachable, new connections are refused. Existing ones are
    /// left alone; pair with [`sever_connections`](Self::sever_connections)
    /// to model a full outage.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Drop every open connection as if the broker went away.
    /// Unacknowledged deliveries go back to their queues.
    pub fn sever_connections(&self) {
        let ids: Vec<u64> = self.lock().connections.keys().copied().collect();
        for id in ids {
            self.drop_connection(id);
        }
    }

    fn drop_connection(&self, id: u64) {
        let mut state = self.lock();
        let token = state.connections.remove(&id);
        for queue in state.queues.values_mut() {
            let tags: Vec<u64> = queue
                .unacked
                .iter()
                .filter(|(_, u)| u.connection == id)
                .map(|(tag, _)| *tag)
                .collect();
            if tags.is_empty() {
                continue;
            }
            for tag in tags {
                if let Some(unacked) = queue.unacked.remove(&tag) {
                    unacked.in_flight.fetch_sub(1, Ordering::SeqCst);
                    queue.ready.push_front(Queued {
                        envelope: unacked.message.envelope,
                        redelivered: true,
                    });
                }
            }
            queue.notify.notify_waiters();
        }
        drop(state);
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Every message accepted so far, in publish order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    /// Messages waiting for a consumer.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    /// Messages delivered but not yet settled.
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.unacked.len())
    }

    /// Number of connections successfully opened since creation.
    pub fn connection_count(&self) -> usize {
        self.lock().connects
    }

    pub fn open_connections(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn has_exchange(&self, name: &str) -> bool {
        self.lock().exchanges.contains_key(name)
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.lock().queues.contains_key(name)
    }

    pub fn has_binding(&self, queue: &str, exchange: &str, routing_key: &str) -> bool {
        self.lock()
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.exchange == exchange && b.routing_key == routing_key)
    }

    fn route(
        state: &State,
        exchange: &str,
        routing_key: &str,
    ) -> Result<Vec<String>, MessagingError> {
        if exchange.is_empty() {
            return Ok(state
                .queues
                .contains_key(routing_key)
                .then(|| routing_key.to_owned())
                .into_iter()
                .collect());
        }
        let kind = state.exchanges.get(exchange).ok_or_else(|| {
            MessagingError::PublishFailure(format!("no exchange '{exchange}'"))
        })?;
        let mut targets: Vec<String> = Vec::new();
        for binding in state.bindings.iter().filter(|b| b.exchange == exchange) {
            let matched = match kind {
                ExchangeKind::Direct => binding.routing_key == routing_key,
                ExchangeKind::Fanout => true,
                ExchangeKind::Topic => topic_matches(&binding.routing_key, routing_key),
            };
            if matched && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }
        Ok(targets)
    }

    /// Hand out the next ready message, respecting the consumer's prefetch.
    fn take_next(
        &self,
        queue: &str,
        connection: u64,
        auto_ack: bool,
        prefetch: u16,
        in_flight: &Arc<AtomicUsize>,
    ) -> Result<Option<(u64, Queued)>, MessagingError> {
        let mut state = self.lock();
        let tag = state.next_tag + 1;
        let queue = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::Broker(format!("no queue '{queue}'")))?;
        if !auto_ack && prefetch > 0 && in_flight.load(Ordering::SeqCst) >= usize::from(prefetch) {
            return Ok(None);
        }
        let Some(message) = queue.ready.pop_front() else {
            return Ok(None);
        };
        if !auto_ack {
            in_flight.fetch_add(1, Ordering::SeqCst);
            queue.unacked.insert(
                tag,
                Unacked {
                    connection,
                    message: message.clone(),
                    in_flight: in_flight.clone(),
                },
            );
        }
        state.next_tag = tag;
        Ok(Some((tag, message)))
    }

    fn settle(&self, queue: &str, tag: u64, requeue: Option<bool>) -> Result<(), MessagingError> {
        let mut state = self.lock();
        let queue = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::Broker(format!("no queue '{queue}'")))?;
        let unacked = queue
            .unacked
            .remove(&tag)
            .ok_or_else(|| MessagingError::Broker(format!("unknown delivery tag {tag}")))?;
        unacked.in_flight.fetch_sub(1, Ordering::SeqCst);
        if requeue == Some(true) {
            queue.ready.push_front(Queued {
                envelope: unacked.message.envelope,
                redelivered: true,
            });
        }
        queue.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn BrokerConnection>, MessagingError> {
        let mut state = self.lock();
        if !state.reachable {
            return Err(MessagingError::ConnectFailure(
                "broker unreachable".to_owned(),
            ));
        }
        state.next_connection += 1;
        state.connects += 1;
        let id = state.next_connection;
        let alive = CancellationToken::new();
        state.connections.insert(id, alive.clone());
        Ok(Arc::new(MemoryConnection {
            id,
            broker: self.clone(),
            alive,
        }))
    }
}

struct MemoryConnection {
    id: u64,
    broker: MemoryBroker,
    alive: CancellationToken,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, MessagingError> {
        if self.alive.is_cancelled() {
            return Err(MessagingError::Broker("connection closed".to_owned()));
        }
        Ok(Arc::new(MemoryChannel {
            connection: self.id,
            broker: self.broker.clone(),
            open: self.alive.child_token(),
            prefetch: AtomicU16::new(0),
        }))
    }

    fn on_disconnect(&self) -> BoxFuture<'static, String> {
        let alive = self.alive.clone();
        Box::pin(async move {
            alive.cancelled().await;
            "connection closed by broker".to_owned()
        })
    }

    fn is_open(&self) -> bool {
        !self.alive.is_cancelled()
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.broker.drop_connection(self.id);
        Ok(())
    }
}

struct MemoryChannel {
    connection: u64,
    broker: MemoryBroker,
    open: CancellationToken,
    prefetch: AtomicU16,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<(), MessagingError> {
        if self.open.is_cancelled() {
            Err(closed())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        _durable: bool,
    ) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        if let Some(existing) = state.exchanges.get(name).copied() {
            if existing != kind {
                return Err(MessagingError::Broker(format!(
                    "exchange '{name}' already declared as {existing}"
                )));
            }
            return Ok(());
        }
        state.exchanges.insert(name.to_owned(), kind);
        Ok(())
    }

    async fn declare_queue(
        &self,
        name: &str,
        _durable: bool,
        _auto_delete: bool,
    ) -> Result<(), MessagingError> {
        self.ensure_open()?;
        self.broker
            .lock()
            .queues
            .entry(name.to_owned())
            .or_insert_with(QueueState::new);
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let mut state = self.broker.lock();
        if !state.queues.contains_key(queue) {
            return Err(MessagingError::Broker(format!("no queue '{queue}'")));
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(MessagingError::Broker(format!("no exchange '{exchange}'")));
        }
        let binding = Binding {
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        };
        if !state.bindings.contains(&binding) {
            state.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        flags: PublishFlags,
        envelope: Envelope,
    ) -> Result<(), MessagingError> {
        if self.open.is_cancelled() {
            return Err(MessagingError::PublishFailure("channel closed".to_owned()));
        }
        let mut state = self.broker.lock();
        let targets = MemoryBroker::route(&state, exchange, routing_key)?;
        if targets.is_empty() && flags.mandatory {
            return Err(MessagingError::PublishFailure(format!(
                "unroutable message for '{exchange}' with key '{routing_key}'"
            )));
        }
        for name in &targets {
            if let Some(queue) = state.queues.get_mut(name) {
                queue.ready.push_back(Queued {
                    envelope: envelope.clone(),
                    redelivered: false,
                });
                queue.notify.notify_waiters();
            }
        }
        state.published.push(PublishedMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            envelope,
        });
        Ok(())
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), MessagingError> {
        self.ensure_open()?;
        self.prefetch.store(prefetch_count, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, MessagingError> {
        self.ensure_open()?;
        let notify = self
            .broker
            .lock()
            .queues
            .get(queue)
            .map(|q| q.notify.clone())
            .ok_or_else(|| MessagingError::Broker(format!("no queue '{queue}'")))?;

        let cursor = Cursor {
            broker: self.broker.clone(),
            queue: queue.to_owned(),
            connection: self.connection,
            auto_ack: options.auto_ack,
            prefetch: self.prefetch.load(Ordering::SeqCst),
            in_flight: Arc::new(AtomicUsize::new(0)),
            open: self.open.clone(),
            notify,
        };
        Ok(futures::stream::unfold(cursor, |cursor| async move {
            let next = cursor.next().await?;
            Some((next, cursor))
        })
        .boxed())
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.open.cancel();
        Ok(())
    }
}

struct Cursor {
    broker: MemoryBroker,
    queue: String,
    connection: u64,
    auto_ack: bool,
    prefetch: u16,
    in_flight: Arc<AtomicUsize>,
    open: CancellationToken,
    notify: Arc<Notify>,
}

impl Cursor {
    /// Wait for the next delivery. `None` ends the stream.
    async fn next(&self) -> Option<Result<Delivery, MessagingError>> {
        loop {
            tokio::task::yield_now().await;
            if self.open.is_cancelled() {
                return None;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.broker.take_next(
                &self.queue,
                self.connection,
                self.auto_ack,
                self.prefetch,
                &self.in_flight,
            ) {
                Err(err) => return Some(Err(err)),
                Ok(Some((tag, message))) => {
                    let acker = MemoryAcker {
                        broker: self.broker.clone(),
                        queue: self.queue.clone(),
                        tag,
                        auto_ack: self.auto_ack,
                        settled: AtomicBool::new(false),
                    };
                    return Some(Ok(Delivery::new(
                        message.envelope,
                        message.redelivered,
                        Box::new(acker),
                    )));
                }
                Ok(None) => {}
            }

            tokio::select! {
                _ = self.open.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }
}

struct MemoryAcker {
    broker: MemoryBroker,
    queue: String,
    tag: u64,
    auto_ack: bool,
    settled: AtomicBool,
}

impl MemoryAcker {
    fn settle(&self, requeue: Option<bool>) -> Result<(), MessagingError> {
        if self.auto_ack {
            return Ok(());
        }
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(MessagingError::Broker(format!(
                "delivery {} already settled",
                self.tag
            )));
        }
        self.broker.settle(&self.queue, self.tag, requeue)
    }
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<(), MessagingError> {
        self.settle(None)
    }

    async fn nack(&self, requeue: bool) -> Result<(), MessagingError> {
        self.settle(Some(requeue))
    }
}

/// AMQP topic matching: `*` matches one word, `#` matches zero or more.
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    fn walk(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.split_first(), key.split_first()) {
            (None, None) => true,
            (Some((&"#", rest)), _) => {
                walk(rest, key) || (!key.is_empty() && walk(pattern, &key[1..]))
            }
            (Some((&"*", rest)), Some((_, key_rest))) => walk(rest, key_rest),
            (Some((word, rest)), Some((part, key_rest))) if word == part => walk(rest, key_rest),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    walk(&pattern, &key)
}
