//! Reliable messaging over RabbitMQ: supervised connections, publishers,
//! consumers, and the transactional outbox and inbox built on them.

pub mod amqp;
pub mod broker;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod inbox;
pub mod memory;
pub mod migration;
pub mod outbox;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod schema;
pub mod topology;

pub use error::MessagingError;
