use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::MessagingError;
use crate::outbox::record::OutboxRecord;
use crate::outbox::store::OutboxStore;
use crate::registry::Registry;
use crate::retry::{RetryDecision, RetryPolicy};

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub batch_size: u64,
    pub poll_interval: Duration,
    /// How long a claimed record stays invisible to other relays.
    pub lease: Duration,
    pub retry: RetryPolicy,
    /// Delete sent records older than this on every tick.
    pub retention: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            lease: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            retention: None,
        }
    }
}

/// Outcome of one relay tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Records whose outcome could not be stored. They stay in flight until
    /// their lease runs out.
    pub store_errors: usize,
    pub purged: u64,
}

pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    registry: Arc<Registry>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn OutboxStore>, registry: Arc<Registry>, config: RelayConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Claim one batch and try to publish each record under its own
    /// message id.
    pub async fn run_once(&self) -> Result<RelayReport, MessagingError> {
        let now = Utc::now();
        let batch = self
            .store
            .claim_batch(self.config.batch_size, now, self.config.lease)
            .await?;

        let mut report = RelayReport {
            claimed: batch.len(),
            ..RelayReport::default()
        };
        for record in batch {
            let message_id = record.message_id.clone();
            if let Err(err) = self.relay(record, &mut report).await {
                report.store_errors += 1;
                tracing::error!(%message_id, error = %err, "failed to record outbox outcome");
            }
        }

        if let Some(retention) = self.config.retention {
            let retention = chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::days(7));
            report.purged = self.store.purge_sent(now - retention).await?;
        }
        Ok(report)
    }

    async fn relay(
        &self,
        record: OutboxRecord,
        report: &mut RelayReport,
    ) -> Result<(), MessagingError> {
        let OutboxRecord {
            id,
            message_id,
            exchange,
            routing_key,
            payload,
            headers,
            retry_count,
            ..
        } = record;

        let publisher = self.registry.publisher_for(&exchange, &routing_key);
        let err = match publisher.publish_with_id(&message_id, payload, headers).await {
            Ok(()) => {
                self.store.mark_sent(id, Utc::now()).await?;
                report.sent += 1;
                tracing::debug!(%message_id, %exchange, %routing_key, "outbox message sent");
                return Ok(());
            }
            Err(err) => err.to_string(),
        };

        let attempt = retry_count + 1;
        match self.config.retry.decide(attempt, Utc::now()) {
            RetryDecision::RetryAt(at) => {
                self.store.mark_failed(id, &err, Some(at)).await?;
                report.failed += 1;
                tracing::warn!(
                    %message_id,
                    attempt,
                    retry_at = %at,
                    error = %err,
                    "outbox publish failed"
                );
            }
            RetryDecision::GiveUp => {
                self.store.mark_failed(id, &err, None).await?;
                report.failed += 1;
                tracing::warn!(
                    %message_id,
                    attempt,
                    error = %err,
                    "outbox publish failed, not retrying"
                );
            }
            RetryDecision::DeadLetter => {
                self.store.mark_dead_lettered(id, &err).await?;
                report.dead_lettered += 1;
                tracing::error!(%message_id, attempt, error = %err, "outbox message dead-lettered");
            }
        }
        Ok(())
    }

    /// Tick every poll interval until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.config.poll_interval, "outbox relay started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.run_once().await {
                    Ok(report) if report.claimed > 0 => tracing::info!(
                        claimed = report.claimed,
                        sent = report.sent,
                        failed = report.failed,
                        dead_lettered = report.dead_lettered,
                        "outbox relay tick"
                    ),
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "outbox relay tick failed"),
                },
            }
        }
        tracing::info!("outbox relay stopped");
    }
}
