use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use uuid::Uuid;

use crate::error::MessagingError;
use crate::inbox::record::InboxRecord;
use crate::inbox::store::InboxStore;
use crate::schema::inbox_messages::{self, Column};

#[derive(Clone)]
pub struct DbInboxStore {
    pub db: DatabaseConnection,
}

impl DbInboxStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn attempts(attempts: u32) -> i32 {
        i32::try_from(attempts).unwrap_or(i32::MAX)
    }
}

#[async_trait]
impl InboxStore for DbInboxStore {
    async fn save(
        &self,
        message_id: &str,
        queue: &str,
        payload: &[u8],
    ) -> Result<bool, MessagingError> {
        let row = inbox_messages::ActiveModel {
            id: Set(Uuid::now_v7()),
            message_id: Set(message_id.to_owned()),
            queue: Set(queue.to_owned()),
            payload: Set(payload.to_vec()),
            processed: Set(false),
            processed_at: Set(None),
            created_at: Set(Utc::now()),
            attempts: Set(0),
            last_error: Set(None),
            quarantined_at: Set(None),
        };
        let inserted = inbox_messages::Entity::insert(row)
            .on_conflict(OnConflict::column(Column::MessageId).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await
            .context("save inbox message")?;
        Ok(inserted > 0)
    }

    async fn fetch_unprocessed(
        &self,
        queue: &str,
        limit: u64,
    ) -> Result<Vec<InboxRecord>, MessagingError> {
        let models = inbox_messages::Entity::find()
            .filter(Column::Queue.eq(queue))
            .filter(Column::Processed.eq(false))
            .filter(Column::QuarantinedAt.is_null())
            .order_by_asc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("fetch unprocessed inbox messages")?;
        Ok(models.into_iter().map(record_from_model).collect())
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        inbox_messages::Entity::update_many()
            .set(inbox_messages::ActiveModel {
                processed: Set(true),
                processed_at: Set(Some(processed_at)),
                ..Default::default()
            })
            .filter(Column::MessageId.eq(message_id))
            .exec(&self.db)
            .await
            .context("mark inbox message processed")?;
        Ok(())
    }

    async fn record_failure(
        &self,
        message_id: &str,
        attempts: u32,
        error: &str,
    ) -> Result<(), MessagingError> {
        inbox_messages::Entity::update_many()
            .set(inbox_messages::ActiveModel {
                attempts: Set(Self::attempts(attempts)),
                last_error: Set(Some(error.to_owned())),
                ..Default::default()
            })
            .filter(Column::MessageId.eq(message_id))
            .exec(&self.db)
            .await
            .context("record inbox failure")?;
        Ok(())
    }

    async fn quarantine(
        &self,
        message_id: &str,
        attempts: u32,
        error: &str,
        quarantined_at: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        inbox_messages::Entity::update_many()
            .set(inbox_messages::ActiveModel {
                attempts: Set(Self::attempts(attempts)),
                last_error: Set(Some(error.to_owned())),
                quarantined_at: Set(Some(quarantined_at)),
                ..Default::default()
            })
            .filter(Column::MessageId.eq(message_id))
            .exec(&self.db)
            .await
            .context("quarantine inbox message")?;
        Ok(())
    }

    async fn find(&self, message_id: &str) -> Result<Option<InboxRecord>, MessagingError> {
        let model = inbox_messages::Entity::find()
            .filter(Column::MessageId.eq(message_id))
            .one(&self.db)
            .await
            .context("find inbox message")?;
        Ok(model.map(record_from_model))
    }
}

fn record_from_model(model: inbox_messages::Model) -> InboxRecord {
    InboxRecord {
        id: model.id,
        message_id: model.message_id,
        queue: model.queue,
        payload: model.payload,
        processed: model.processed,
        processed_at: model.processed_at,
        created_at: model.created_at,
        attempts: u32::try_from(model.attempts).unwrap_or_default(),
        last_error: model.last_error,
        quarantined_at: model.quarantined_at,
    }
}
