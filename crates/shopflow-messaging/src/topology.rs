//! Exchange, queue and binding declarations, plus the presets wiring the
//! orders and payments services together.

use crate::consumer::ConsumerConfig;
use crate::envelope::ExchangeKind;
use crate::publisher::PublisherConfig;

pub const ORDERS_EXCHANGE: &str = "orders";
pub const PAYMENTS_EXCHANGE: &str = "payments";

pub const PAYMENT_REQUESTS_QUEUE: &str = "payments.payment_requests";
pub const PAYMENT_RESULTS_QUEUE: &str = "orders.payment_results";

pub const PAYMENT_REQUEST_KEY: &str = "payment.request";
pub const PAYMENT_RESULT_KEY: &str = "payment.result";

pub const PAYMENTS_CONSUMER_TAG: &str = "payments-service";
pub const ORDERS_CONSUMER_TAG: &str = "orders-service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

/// Declarations applied in order: exchanges, then queues, then bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub exchanges: Vec<ExchangeSpec>,
    pub queues: Vec<QueueSpec>,
    pub bindings: Vec<BindingSpec>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Durable exchange.
    pub fn exchange(mut self, name: &str, kind: ExchangeKind) -> Self {
        self.exchanges.push(ExchangeSpec {
            name: name.to_owned(),
            kind,
            durable: true,
        });
        self
    }

    /// Durable queue that outlives its consumers.
    pub fn queue(mut self, name: &str) -> Self {
        self.queues.push(QueueSpec {
            name: name.to_owned(),
            durable: true,
            auto_delete: false,
        });
        self
    }

    pub fn bind(mut self, queue: &str, exchange: &str, routing_key: &str) -> Self {
        self.bindings.push(BindingSpec {
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        });
        self
    }
}

/// Both payment flows. Each service declares the full set, so either one
/// can start first.
pub fn shop_topology() -> Topology {
    Topology::new()
        .exchange(ORDERS_EXCHANGE, ExchangeKind::Direct)
        .exchange(PAYMENTS_EXCHANGE, ExchangeKind::Direct)
        .queue(PAYMENT_REQUESTS_QUEUE)
        .queue(PAYMENT_RESULTS_QUEUE)
        .bind(PAYMENT_REQUESTS_QUEUE, ORDERS_EXCHANGE, PAYMENT_REQUEST_KEY)
        .bind(PAYMENT_RESULTS_QUEUE, PAYMENTS_EXCHANGE, PAYMENT_RESULT_KEY)
}

pub fn payment_request_publisher() -> PublisherConfig {
    PublisherConfig::new(ORDERS_EXCHANGE, PAYMENT_REQUEST_KEY)
}

pub fn payment_result_publisher() -> PublisherConfig {
    PublisherConfig::new(PAYMENTS_EXCHANGE, PAYMENT_RESULT_KEY)
}

pub fn payment_request_consumer(prefetch_count: u16) -> ConsumerConfig {
    ConsumerConfig::new(PAYMENT_REQUESTS_QUEUE, PAYMENTS_CONSUMER_TAG).with_prefetch(prefetch_count)
}

pub fn payment_result_consumer(prefetch_count: u16) -> ConsumerConfig {
    ConsumerConfig::new(PAYMENT_RESULTS_QUEUE, ORDERS_CONSUMER_TAG).with_prefetch(prefetch_count)
}
