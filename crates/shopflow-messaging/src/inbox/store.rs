use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MessagingError;
use crate::inbox::record::InboxRecord;

#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Insert unless `message_id` is already stored. Returns whether a row
    /// was written.
    async fn save(
        &self,
        message_id: &str,
        queue: &str,
        payload: &[u8],
    ) -> Result<bool, MessagingError>;

    /// Unprocessed, non-quarantined records of `queue`, oldest first.
    async fn fetch_unprocessed(
        &self,
        queue: &str,
        limit: u64,
    ) -> Result<Vec<InboxRecord>, MessagingError>;

    async fn mark_processed(
        &self,
        message_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), MessagingError>;

    async fn record_failure(
        &self,
        message_id: &str,
        attempts: u32,
        error: &str,
    ) -> Result<(), MessagingError>;

    async fn quarantine(
        &self,
        message_id: &str,
        attempts: u32,
        error: &str,
        quarantined_at: DateTime<Utc>,
    ) -> Result<(), MessagingError>;

    async fn find(&self, message_id: &str) -> Result<Option<InboxRecord>, MessagingError>;
}

/// Inbox kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryInboxStore {
    records: Arc<Mutex<Vec<InboxRecord>>>,
}

impl MemoryInboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<InboxRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn records(&self) -> Vec<InboxRecord> {
        self.lock().clone()
    }

    fn update<F>(&self, message_id: &str, apply: F) -> Result<(), MessagingError>
    where
        F: FnOnce(&mut InboxRecord),
    {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.message_id == message_id)
            .ok_or_else(|| {
                MessagingError::Store(anyhow::anyhow!("inbox record {message_id} not found"))
            })?;
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl InboxStore for MemoryInboxStore {
    async fn save(
        &self,
        message_id: &str,
        queue: &str,
        payload: &[u8],
    ) -> Result<bool, MessagingError> {
        let mut records = self.lock();
        if records.iter().any(|r| r.message_id == message_id) {
            return Ok(false);
        }
        records.push(InboxRecord::new(message_id, queue, payload, Utc::now()));
        Ok(true)
    }

    async fn fetch_unprocessed(
        &self,
        queue: &str,
        limit: u64,
    ) -> Result<Vec<InboxRecord>, MessagingError> {
        let mut pending: Vec<InboxRecord> = self
            .lock()
            .iter()
            .filter(|r| r.queue == queue && r.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(pending)
    }

    async fn mark_processed(
        &self,
        message_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        self.update(message_id, |r| {
            r.processed = true;
            r.processed_at = Some(processed_at);
        })
    }

    async fn record_failure(
        &self,
        message_id: &str,
        attempts: u32,
        error: &str,
    ) -> Result<(), MessagingError> {
        self.update(message_id, |r| {
            r.attempts = attempts;
            r.last_error = Some(error.to_owned());
        })
    }

    async fn quarantine(
        &self,
        message_id: &str,
        attempts: u32,
        error: &str,
        quarantined_at: DateTime<Utc>,
    ) -> Result<(), MessagingError> {
        self.update(message_id, |r| {
            r.attempts = attempts;
            r.last_error = Some(error.to_owned());
            r.quarantined_at = Some(quarantined_at);
        })
    }

    async fn find(&self, message_id: &str) -> Result<Option<InboxRecord>, MessagingError> {
        Ok(self.lock().iter().find(|r| r.message_id == message_id).cloned())
    }
}
