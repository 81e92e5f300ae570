//! Inbox deduplication: inbound messages are stored once per message id,
//! acknowledged, and drained into business handlers by a poller.

mod db;
mod processor;
mod record;
mod store;
mod writer;

pub use db::DbInboxStore;
pub use processor::{
    DrainReport, InboundFn, InboundHandler, Inbox, InboxConfig, InboxProcessor, inbound_fn,
};
pub use record::InboxRecord;
pub use store::{InboxStore, MemoryInboxStore};
pub use writer::{InboxWriter, derived_message_id};
