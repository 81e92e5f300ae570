use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use uuid::Uuid;

use crate::envelope::Headers;
use crate::error::MessagingError;
use crate::outbox::record::{NewOutboxMessage, OutboxRecord, OutboxStatus};
use crate::outbox::store::{OutboxStore, lease_until};
use crate::schema::outbox_messages::{self, Column};

/// Insert an outbox row on any connection or open transaction. Call it inside
/// the transaction that commits the domain change being announced.
pub async fn enqueue<C: ConnectionTrait>(
    conn: &C,
    message: &NewOutboxMessage,
) -> Result<(), DbErr> {
    let headers = message
        .headers
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| DbErr::Custom(format!("encode outbox headers: {e}")))?;

    outbox_messages::ActiveModel {
        id: Set(message.id),
        message_id: Set(message.message_id.clone()),
        exchange: Set(message.exchange.clone()),
        routing_key: Set(message.routing_key.clone()),
        payload: Set(message.payload.clone()),
        headers: Set(headers),
        status: Set(OutboxStatus::Pending.as_str().to_owned()),
        created_at: Set(Utc::now()),
        sent_at: Set(None),
        error: Set(None),
        retry_count: Set(0),
        next_attempt_at: Set(None),
    }
    .insert(conn)
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct DbOutboxStore {
    pub db: DatabaseConnection,
}

impl DbOutboxStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn claimable(now: DateTime<Utc>) -> Condition {
    Condition::any()
        .add(Column::Status.eq(OutboxStatus::Pending.as_str()))
        .add(
            Condition::all()
                .add(Column::Status.is_in([
                    OutboxStatus::Failed.as_str(),
                    OutboxStatus::InFlight.as_str(),
                ]))
                .add(Column::NextAttemptAt.lte(now)),
        )
}

#[async_trait]
impl OutboxStore for DbOutboxStore {
    async fn insert(&self, message: NewOutboxMessage) -> Result<OutboxRecord, MessagingError> {
        enqueue(&self.db, &message)
            .await
            .context("insert outbox message")?;
        let model = outbox_messages::Entity::find_by_id(message.id)
            .one(&self.db)
            .await
            .context("reload outbox message")?
            .context("outbox message vanished after insert")?;
        record_from_model(model)
    }

    async fn claim_batch(
        &self,
        limit: u64,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<OutboxRecord>, MessagingError> {
        let deadline = lease_until(now, lease);
        let models = self
            .db
            .transaction::<_, Vec<outbox_messages::Model>, DbErr>(move |txn| {
                Box::pin(async move {
                    let models = outbox_messages::Entity::find()
                        .filter(claimable(now))
                        .order_by_asc(Column::CreatedAt)
                        .limit(limit)
                        .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
                        .all(txn)
                        .await?;
                    if models.is_empty() {
                        return Ok(models);
                    }

                    let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
                    outbox_messages::Entity::update_many()
                        .col_expr(Column::Status, Expr::value(OutboxStatus::InFlight.as_str()))
                        .col_expr(Column::NextAttemptAt, Expr::value(deadline))
                        .filter(Column::Id.is_in(ids))
                        .exec(txn)
                        .await?;
                    Ok(models)
                })
            })
            .await
            .context("claim outbox batch")?;

        models
            .into_iter()
            .map(|model| {
                let mut record = record_from_model(model)?;
                record.status = OutboxStatus::InFlight;
                record.next_attempt_at = Some(deadline);
                Ok(record)
            })
            .collect()
    }

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), MessagingError> {
        outbox_messages::ActiveModel {
            id: Set(id),
            status: Set(OutboxStatus::Sent.as_str().to_owned()),
            sent_at: Set(Some(sent_at)),
            error: Set(None),
            next_attempt_at: Set(None),
            ..Default::default()
        }
        .update(&self.db)
        .await
        .context("mark outbox message sent")?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), MessagingError> {
        outbox_messages::Entity::update_many()
            .col_expr(Column::Status, Expr::value(OutboxStatus::Failed.as_str()))
            .col_expr(Column::Error, Expr::value(error.to_owned()))
            .col_expr(Column::RetryCount, Expr::col(Column::RetryCount).add(1))
            .col_expr(Column::NextAttemptAt, Expr::value(retry_at))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("mark outbox message failed")?;
        Ok(())
    }

    async fn mark_dead_lettered(&self, id: Uuid, error: &str) -> Result<(), MessagingError> {
        outbox_messages::Entity::update_many()
            .col_expr(Column::Status, Expr::value(OutboxStatus::DeadLettered.as_str()))
            .col_expr(Column::Error, Expr::value(error.to_owned()))
            .col_expr(Column::RetryCount, Expr::col(Column::RetryCount).add(1))
            .col_expr(Column::NextAttemptAt, Expr::value(Option::<DateTime<Utc>>::None))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("dead-letter outbox message")?;
        Ok(())
    }

    async fn readmit(&self, message_id: &str) -> Result<bool, MessagingError> {
        let result = outbox_messages::Entity::update_many()
            .col_expr(Column::Status, Expr::value(OutboxStatus::Pending.as_str()))
            .col_expr(Column::NextAttemptAt, Expr::value(Option::<DateTime<Utc>>::None))
            .filter(Column::MessageId.eq(message_id))
            .filter(Column::Status.is_in([
                OutboxStatus::Failed.as_str(),
                OutboxStatus::DeadLettered.as_str(),
            ]))
            .exec(&self.db)
            .await
            .context("readmit outbox message")?;
        Ok(result.rows_affected > 0)
    }

    async fn purge_sent(&self, before: DateTime<Utc>) -> Result<u64, MessagingError> {
        let result = outbox_messages::Entity::delete_many()
            .filter(Column::Status.eq(OutboxStatus::Sent.as_str()))
            .filter(Column::SentAt.lt(before))
            .exec(&self.db)
            .await
            .context("purge sent outbox messages")?;
        Ok(result.rows_affected)
    }

    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<OutboxRecord>, MessagingError> {
        let model = outbox_messages::Entity::find()
            .filter(Column::MessageId.eq(message_id))
            .one(&self.db)
            .await
            .context("find outbox message")?;
        model.map(record_from_model).transpose()
    }
}

fn record_from_model(model: outbox_messages::Model) -> Result<OutboxRecord, MessagingError> {
    let headers = model
        .headers
        .map(serde_json::from_value::<Headers>)
        .transpose()
        .context("decode outbox headers")?;
    Ok(OutboxRecord {
        id: model.id,
        message_id: model.message_id,
        exchange: model.exchange,
        routing_key: model.routing_key,
        payload: model.payload,
        headers,
        status: model.status.parse()?,
        created_at: model.created_at,
        sent_at: model.sent_at,
        error: model.error,
        retry_count: u32::try_from(model.retry_count).unwrap_or_default(),
        next_attempt_at: model.next_attempt_at,
    })
}
