use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::MessagingError;
use crate::outbox::record::{NewOutboxMessage, OutboxRecord, OutboxStatus};

/// Persistence for outbox records.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn insert(&self, message: NewOutboxMessage) -> Result<OutboxRecord, MessagingError>;

    /// Atomically select up to `limit` claimable records, oldest first, and
    /// mark them in flight until `now + lease`.
    async fn claim_batch(
        &self,
        limit: u64,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<OutboxRecord>, MessagingError>;

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), MessagingError>;

    /// Record a failure and bump `retry_count`. `retry_at = None` leaves the
    /// record failed for good.
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), MessagingError>;

    async fn mark_dead_lettered(&self, id: Uuid, error: &str) -> Result<(), MessagingError>;

    /// Move a failed or dead-lettered record back to pending. Returns false
    /// when no such record exists.
    async fn readmit(&self, message_id: &str) -> Result<bool, MessagingError>;

    async fn purge_sent(&self, before: DateTime<Utc>) -> Result<u64, MessagingError>;

    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<OutboxRecord>, MessagingError>;
}

pub(crate) fn lease_until(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::minutes(1))
}

/// Outbox kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryOutboxStore {
    records: Arc<Mutex<Vec<OutboxRecord>>>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutboxRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record in any state.
    pub fn put(&self, record: OutboxRecord) {
        self.lock().push(record);
    }

    pub fn records(&self) -> Vec<OutboxRecord> {
        self.lock().clone()
    }

    fn update<F>(&self, id: Uuid, apply: F) -> Result<(), MessagingError>
    where
        F: FnOnce(&mut OutboxRecord),
    {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| MessagingError::Store(anyhow::anyhow!("outbox record {id} not found")))?;
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn insert(&self, message: NewOutboxMessage) -> Result<OutboxRecord, MessagingError> {
        let mut records = self.lock();
        if records.iter().any(|r| r.message_id == message.message_id) {
            return Err(MessagingError::Store(anyhow::anyhow!(
                "duplicate outbox message_id {}",
                message.message_id
            )));
        }
        let record = message.into_record(Utc::now());
        records.push(record.clone());
        Ok(record)
    }

    async fn claim_batch(
        &self,
        limit: u64,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<OutboxRecord>, MessagingError> {
        let deadline = lease_until(now, lease);
        let mut records = self.lock();
        let mut eligible: Vec<&mut OutboxRecord> =
            records.iter_mut().filter(|r| r.is_claimable(now)).collect();
        eligible.sort_by_key(|r| r.created_at);

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(eligible
            .into_iter()
            .take(limit)
            .map(|record| {
                record.status = OutboxStatus::InFlight;
                record.next_attempt_at = Some(deadline);
                record.clone()
            })
            .collect())
    }

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<(), MessagingError> {
        self.update(id, |r| {
            r.status = OutboxStatus::Sent;
            r.sent_at = Some(sent_at);
            r.error = None;
            r.next_attempt_at = None;
        })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), MessagingError> {
        self.update(id, |r| {
            r.status = OutboxStatus::Failed;
            r.error = Some(error.to_owned());
            r.retry_count += 1;
            r.next_attempt_at = retry_at;
        })
    }

    async fn mark_dead_lettered(&self, id: Uuid, error: &str) -> Result<(), MessagingError> {
        self.update(id, |r| {
            r.status = OutboxStatus::DeadLettered;
            r.error = Some(error.to_owned());
            r.retry_count += 1;
            r.next_attempt_at = None;
        })
    }

    async fn readmit(&self, message_id: &str) -> Result<bool, MessagingError> {
        let mut records = self.lock();
        let Some(record) = records.iter_mut().find(|r| {
            r.message_id == message_id
                && matches!(r.status, OutboxStatus::Failed | OutboxStatus::DeadLettered)
        }) else {
            return Ok(false);
        };
        record.status = OutboxStatus::Pending;
        record.next_attempt_at = None;
        Ok(true)
    }

    async fn purge_sent(&self, before: DateTime<Utc>) -> Result<u64, MessagingError> {
        let mut records = self.lock();
        let len = records.len();
        records.retain(|r| {
            !(r.status == OutboxStatus::Sent && r.sent_at.is_some_and(|at| at < before))
        });
        Ok((len - records.len()) as u64)
    }

    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<OutboxRecord>, MessagingError> {
        Ok(self.lock().iter().find(|r| r.message_id == message_id).cloned())
    }
}
