//! Transactional outbox: records written alongside domain changes and
//! relayed to the broker by a background poller.

mod db;
mod record;
mod relay;
mod store;

pub use db::{DbOutboxStore, enqueue};
pub use record::{NewOutboxMessage, OutboxRecord, OutboxStatus};
pub use relay::{OutboxRelay, RelayConfig, RelayReport};
pub use store::{MemoryOutboxStore, OutboxStore};
