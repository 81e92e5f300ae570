use sea_orm::entity::prelude::*;

/// Message waiting to be relayed to the broker. Written in the same
/// transaction as the domain change it announces.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub message_id: String,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: Option<Json>,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub sent_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub next_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
