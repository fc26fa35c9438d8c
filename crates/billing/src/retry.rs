//! Failed-event retry scheduler
//!
//! Replays recorded failures through the same router/resolver/applier path
//! as live delivery. Invoked on a cadence by the worker and on demand via
//! the authenticated retry endpoint; both may overlap live webhook delivery
//! for the same tenant, which is safe because every transition is an
//! idempotent snapshot.

use sqlx::PgPool;

use crate::client::StripeClient;
use crate::error::BillingResult;
use crate::events::{EventEnvelope, ProcessorEvent};
use crate::failures::{FailedEventRecord, FailedEventStore};
use crate::ledger::ProcessedEventLedger;
use crate::webhooks::WebhookHandler;

/// Failed events examined per invocation
pub const DEFAULT_RETRY_BATCH_SIZE: i64 = 50;

/// Outcome counts for one retry batch
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RetrySummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
}

pub struct RetryService {
    pool: PgPool,
    handler: WebhookHandler,
    ledger: ProcessedEventLedger,
    failures: FailedEventStore,
}

impl RetryService {
    pub fn new(client: StripeClient, pool: PgPool) -> Self {
        Self {
            handler: WebhookHandler::new(client, pool.clone()),
            ledger: ProcessedEventLedger::new(pool.clone()),
            failures: FailedEventStore::new(pool.clone()),
            pool,
        }
    }

    /// Replay every failed event whose backoff window has elapsed.
    ///
    /// Per-record errors are contained: one bad event increments its own
    /// retry count and the batch moves on.
    pub async fn run_batch(&self, batch: i64) -> BillingResult<RetrySummary> {
        let due = self.failures.due_for_retry(batch).await?;
        let mut summary = RetrySummary::default();

        for record in due {
            summary.processed += 1;

            match self.replay(&record).await {
                Ok(()) => {
                    summary.successful += 1;
                    tracing::info!(
                        event_id = %record.event_id,
                        event_type = %record.event_type,
                        retry_count = record.retry_count,
                        "Failed event replayed successfully"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    if let Err(update_err) =
                        self.failures.mark_retry_failed(record.id, &e.to_string()).await
                    {
                        tracing::error!(
                            event_id = %record.event_id,
                            error = %e,
                            update_error = %update_err,
                            "Failed to update retry state after replay failure"
                        );
                    }
                    tracing::warn!(
                        event_id = %record.event_id,
                        event_type = %record.event_type,
                        retry_count = record.retry_count + 1,
                        error = %e,
                        "Failed event replay failed"
                    );
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            successful = summary.successful,
            failed = summary.failed,
            "Retry batch complete"
        );

        Ok(summary)
    }

    /// Re-run one failed event through the pipeline. On success the
    /// processed-event insert and failed-event delete commit as one
    /// transaction, keeping the two stores mutually exclusive per event id.
    async fn replay(&self, record: &FailedEventRecord) -> BillingResult<()> {
        // A live redelivery may have processed this event while it sat in
        // the failed store; in that case just clear the record
        if self.ledger.has_processed(&record.event_id).await? {
            tracing::info!(
                event_id = %record.event_id,
                "Event already processed by live delivery, clearing failed record"
            );
            return self.failures.delete(record.id).await;
        }

        let envelope = EventEnvelope::from_value(record.payload.clone())?;
        let event = ProcessorEvent::from_envelope(&envelope)?;

        if let ProcessorEvent::Unknown { event_type } = &event {
            // Cannot happen through the live pipeline (unknown types are
            // acknowledged, never recorded); clear rather than retry forever
            tracing::warn!(
                event_id = %record.event_id,
                event_type = %event_type,
                "Failed record holds an unhandled event type, clearing"
            );
            return self.failures.delete(record.id).await;
        }

        self.handler.process_event(&event).await?;

        let mut tx = self.pool.begin().await?;
        self.ledger
            .mark_processed_tx(&mut tx, &record.event_id, event.type_tag())
            .await?;
        self.failures.delete_tx(&mut tx, record.id).await?;
        tx.commit().await?;

        Ok(())
    }
}
