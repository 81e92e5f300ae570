//! sea-orm entities for the outbox and inbox tables.

pub mod inbox_messages;
pub mod outbox_messages;
