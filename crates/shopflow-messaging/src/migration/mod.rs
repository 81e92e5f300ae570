//! Outbox and inbox tables. Service migrators append these to their own
//! domain migrations.

use sea_orm_migration::prelude::*;

mod m20250601_000001_create_outbox_messages;
mod m20250601_000002_create_inbox_messages;

pub fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
        Box::new(m20250601_000001_create_outbox_messages::Migration),
        Box::new(m20250601_000002_create_inbox_messages::Migration),
    ]
}
