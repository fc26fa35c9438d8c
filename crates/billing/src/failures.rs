//! Failed-event store
//!
//! Durable record of events that errored after signature verification, kept
//! with their full payload so the retry scheduler can replay them. A record
//! that reaches [`MAX_RETRY_ATTEMPTS`] failures is terminal: it stays in the
//! store for operator intervention and is excluded from selection.

use sqlx::{PgPool, Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::BillingResult;
use crate::events::EventEnvelope;

/// Retries per failed event before the record becomes terminal
pub const MAX_RETRY_ATTEMPTS: i32 = 5;

/// Backoff schedule, minutes to wait after the n-th failed attempt.
/// Kept as an explicit ordered list: the fixed five-step schedule is a
/// deliberate, externally-auditable policy.
pub const RETRY_BACKOFF_MINUTES: [i64; 5] = [5, 15, 60, 240, 1440];

/// Minimum elapsed time since the last attempt for a record that has failed
/// `retry_count` times
pub fn backoff_interval(retry_count: i32) -> Duration {
    let last = RETRY_BACKOFF_MINUTES.len() - 1;
    let idx = usize::try_from(retry_count.saturating_sub(1)).unwrap_or(0).min(last);
    Duration::minutes(RETRY_BACKOFF_MINUTES[idx])
}

/// Selection predicate for the retry scheduler. A record that has never been
/// retried (`last_retry_at` null) is eligible immediately.
pub fn eligible_for_retry(
    retry_count: i32,
    last_retry_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> bool {
    if retry_count >= MAX_RETRY_ATTEMPTS {
        return false;
    }
    match last_retry_at {
        None => true,
        Some(last) => now - last >= backoff_interval(retry_count),
    }
}

/// A stored failed event
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct FailedEventRecord {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub error: String,
    pub retry_count: i32,
    pub last_retry_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl FailedEventRecord {
    pub fn is_terminal(&self) -> bool {
        self.retry_count >= MAX_RETRY_ATTEMPTS
    }
}

#[derive(Clone)]
pub struct FailedEventStore {
    pool: PgPool,
}

impl FailedEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a failed event with its full payload for later replay.
    ///
    /// A redelivery of an event that is already in the failed store keeps
    /// the existing record and its retry state.
    pub async fn record(&self, envelope: &EventEnvelope, error: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_events (event_id, event_type, payload, error)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&envelope.id)
        .bind(&envelope.event_type)
        .bind(envelope.payload())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Select up to `batch` records whose backoff window has elapsed.
    ///
    /// The query filters terminal records and orders oldest-retried first;
    /// the exact per-count backoff check runs here against the schedule so
    /// there is a single source of truth for the policy.
    pub async fn due_for_retry(&self, batch: i64) -> BillingResult<Vec<FailedEventRecord>> {
        let candidates: Vec<FailedEventRecord> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, payload, error,
                   retry_count, last_retry_at, created_at
            FROM failed_events
            WHERE retry_count < $1
            ORDER BY last_retry_at ASC NULLS FIRST, created_at ASC
            LIMIT $2
            "#,
        )
        .bind(MAX_RETRY_ATTEMPTS)
        .bind(batch)
        .fetch_all(&self.pool)
        .await?;

        let now = OffsetDateTime::now_utc();
        Ok(candidates
            .into_iter()
            .filter(|r| eligible_for_retry(r.retry_count, r.last_retry_at, now))
            .collect())
    }

    /// Record another failed attempt
    pub async fn mark_retry_failed(&self, id: Uuid, error: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE failed_events
            SET retry_count = retry_count + 1,
                last_retry_at = NOW(),
                error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a resolved record outside a transaction (used when the live
    /// pipeline already processed the event)
    pub async fn delete(&self, id: Uuid) -> BillingResult<()> {
        sqlx::query("DELETE FROM failed_events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Transactional delete, paired with the processed-event insert
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> BillingResult<()> {
        sqlx::query("DELETE FROM failed_events WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Terminal records awaiting operator intervention
    pub async fn list_terminal(&self, limit: i64) -> BillingResult<Vec<FailedEventRecord>> {
        let records: Vec<FailedEventRecord> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, payload, error,
                   retry_count, last_retry_at, created_at
            FROM failed_events
            WHERE retry_count >= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(MAX_RETRY_ATTEMPTS)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn count_terminal(&self) -> BillingResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_events WHERE retry_count >= $1")
                .bind(MAX_RETRY_ATTEMPTS)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.0)
    }
}
