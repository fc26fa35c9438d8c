//! Idempotency ledger
//!
//! Append-only record of processed event ids. The pre-dispatch existence
//! check short-circuits the common duplicate delivery; the unique constraint
//! on the insert is what actually closes the race when the same event id is
//! in flight twice, so a conflicting insert is reported as "already
//! recorded", never as an error.

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::BillingResult;

#[derive(Clone)]
pub struct ProcessedEventLedger {
    pool: PgPool,
}

impl ProcessedEventLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether an event id has already been fully processed
    pub async fn has_processed(&self, event_id: &str) -> BillingResult<bool> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = $1)")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.0)
    }

    /// Record an event as processed. Returns false when another delivery of
    /// the same event id committed first.
    pub async fn mark_processed(&self, event_id: &str, event_type: &str) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Transactional variant used by the retry path, which must insert the
    /// processed record and delete the failed record as one atomic pair
    pub async fn mark_processed_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: &str,
        event_type: &str,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Retention: drop ledger rows older than the given age. The processor
    /// stops redelivering events long before this window closes.
    pub async fn prune_older_than_days(&self, days: i32) -> BillingResult<u64> {
        let result = sqlx::query(
            "DELETE FROM processed_events WHERE processed_at < NOW() - ($1 || ' days')::INTERVAL",
        )
        .bind(days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
