use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::MessagingError;
use crate::inbox::record::InboxRecord;
use crate::inbox::store::InboxStore;
use crate::inbox::writer::InboxWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxConfig {
    pub batch_size: u64,
    pub poll_interval: Duration,
    /// Failed attempts before a record is quarantined. `None` retries
    /// forever.
    pub max_attempts: Option<u32>,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            max_attempts: Some(5),
        }
    }
}

/// Business callback invoked once per drained inbox record.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, record: &InboxRecord) -> Result<(), MessagingError>;
}

pub struct InboundFn<F>(F);

/// Adapts an async closure into an [`InboundHandler`].
pub fn inbound_fn<F, Fut>(f: F) -> InboundFn<F>
where
    F: Fn(InboxRecord) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MessagingError>> + Send + 'static,
{
    InboundFn(f)
}

#[async_trait]
impl<F, Fut> InboundHandler for InboundFn<F>
where
    F: Fn(InboxRecord) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MessagingError>> + Send + 'static,
{
    async fn handle(&self, record: &InboxRecord) -> Result<(), MessagingError> {
        (self.0)(record.clone()).await
    }
}

/// Entry point handed to domain services.
#[derive(Clone)]
pub struct Inbox {
    store: Arc<dyn InboxStore>,
    config: InboxConfig,
}

impl Inbox {
    pub fn new(store: Arc<dyn InboxStore>, config: InboxConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> Arc<dyn InboxStore> {
        self.store.clone()
    }

    pub async fn save(
        &self,
        message_id: &str,
        queue: &str,
        payload: &[u8],
    ) -> Result<bool, MessagingError> {
        self.store.save(message_id, queue, payload).await
    }

    /// Consumer-side handler that records deliveries from `queue`.
    pub fn writer(&self, queue: &str) -> InboxWriter {
        InboxWriter::new(self.store.clone(), queue)
    }

    /// Register the business callback for records of `queue`.
    pub fn on_inbound(&self, queue: &str, handler: Arc<dyn InboundHandler>) -> InboxProcessor {
        InboxProcessor {
            store: self.store.clone(),
            queue: queue.to_owned(),
            handler,
            config: self.config.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
    pub quarantined: usize,
    /// Rows whose outcome could not be stored; they are picked up again.
    pub store_errors: usize,
}

pub struct InboxProcessor {
    store: Arc<dyn InboxStore>,
    queue: String,
    handler: Arc<dyn InboundHandler>,
    config: InboxConfig,
}

impl InboxProcessor {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Drain one batch in creation order.
    pub async fn run_once(&self) -> Result<DrainReport, MessagingError> {
        let batch = self
            .store
            .fetch_unprocessed(&self.queue, self.config.batch_size)
            .await?;
        let mut report = DrainReport {
            fetched: batch.len(),
            ..DrainReport::default()
        };

        for record in &batch {
            if let Err(err) = self.settle(record, &mut report).await {
                report.store_errors += 1;
                tracing::error!(
                    message_id = %record.message_id,
                    queue = %self.queue,
                    error = %err,
                    "failed to record inbox outcome"
                );
            }
        }
        Ok(report)
    }

    async fn settle(
        &self,
        record: &InboxRecord,
        report: &mut DrainReport,
    ) -> Result<(), MessagingError> {
        let err = match self.handler.handle(record).await {
            Ok(()) => {
                self.store
                    .mark_processed(&record.message_id, Utc::now())
                    .await?;
                report.processed += 1;
                return Ok(());
            }
            Err(err) => err,
        };

        let attempts = record.attempts + 1;
        let exhausted = self.config.max_attempts.is_some_and(|max| attempts >= max);
        if err.is_permanent() || exhausted {
            self.store
                .quarantine(&record.message_id, attempts, &err.to_string(), Utc::now())
                .await?;
            report.quarantined += 1;
            tracing::error!(
                message_id = %record.message_id,
                queue = %self.queue,
                attempts,
                error = %err,
                "inbox message quarantined"
            );
        } else {
            self.store
                .record_failure(&record.message_id, attempts, &err.to_string())
                .await?;
            report.failed += 1;
            tracing::warn!(
                message_id = %record.message_id,
                queue = %self.queue,
                attempts,
                error = %err,
                "inbox handler failed, will retry"
            );
        }
        Ok(())
    }

    /// Drain every poll interval until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(queue = %self.queue, "inbox processor started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.run_once().await {
                    Ok(report) if report.fetched > 0 => tracing::info!(
                        queue = %self.queue,
                        processed = report.processed,
                        failed = report.failed,
                        quarantined = report.quarantined,
                        "inbox drained"
                    ),
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(queue = %self.queue, error = %err, "inbox drain failed")
                    }
                },
            }
        }
        tracing::info!(queue = %self.queue, "inbox processor stopped");
    }
}
