//! Shopkit Background Worker
//!
//! Handles scheduled jobs including:
//! - Failed webhook event retries on the backoff schedule (every 5 minutes)
//! - Terminal failed-event reporting for operator intervention (hourly)
//! - Processed-event ledger retention pruning (daily at 3:00 AM UTC)

use std::sync::Arc;
use std::time::Duration;

use shopkit_billing::{BillingService, DEFAULT_RETRY_BATCH_SIZE};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Days a processed-event row is kept before retention pruning. The
/// processor stops redelivering events well inside this window.
const LEDGER_RETENTION_DAYS: i32 = 90;

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Shopkit Worker");

    let pool = create_db_pool().await?;

    let billing = match BillingService::from_env(pool.clone()) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            // If Stripe isn't configured, run in minimal mode
            warn!(error = %e, "Failed to create billing service - running in minimal mode");
            info!("Worker running without Stripe integration");

            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                info!("Worker heartbeat (minimal mode)");
            }
        }
    };

    let scheduler = JobScheduler::new().await?;

    // Job 1: Replay failed webhook events (every 5 minutes)
    // The backoff schedule itself gates per-record eligibility; the cadence
    // only bounds how quickly an eligible record is picked up
    let retry_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _l| {
            let billing = retry_billing.clone();
            Box::pin(async move {
                info!("Running failed webhook event retry batch");
                match billing.retry.run_batch(DEFAULT_RETRY_BATCH_SIZE).await {
                    Ok(summary) => {
                        info!(
                            processed = summary.processed,
                            successful = summary.successful,
                            failed = summary.failed,
                            "Webhook retry batch complete"
                        );
                    }
                    Err(e) => error!(error = %e, "Webhook retry batch failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Failed webhook retry batch (every 5 minutes)");

    // Job 2: Report terminal failed events (hourly)
    // These exhausted their retries and stay in the store until an operator
    // intervenes; surfacing them at error severity is the alert channel
    let terminal_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let billing = terminal_billing.clone();
            Box::pin(async move {
                match billing.failures.count_terminal().await {
                    Ok(0) => info!("No terminal failed webhook events"),
                    Ok(count) => {
                        error!(
                            count = count,
                            "Terminal failed webhook events awaiting manual intervention"
                        );
                    }
                    Err(e) => error!(error = %e, "Failed to count terminal events"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Terminal failed-event report (hourly)");

    // Job 3: Prune old processed-event ledger rows (daily at 3:00 AM UTC)
    let prune_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let billing = prune_billing.clone();
            Box::pin(async move {
                info!("Running processed-event ledger pruning");
                match billing.ledger.prune_older_than_days(LEDGER_RETENTION_DAYS).await {
                    Ok(deleted) => info!(deleted = deleted, "Ledger pruning complete"),
                    Err(e) => error!(error = %e, "Ledger pruning failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Processed-event ledger pruning (daily at 3:00 AM UTC)");

    // Job 4: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Shopkit Worker started successfully with {} scheduled jobs", 4);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
