// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shopkit Billing Module
//!
//! Keeps tenant subscription state in sync with Stripe under at-least-once,
//! out-of-order, and duplicated webhook delivery.
//!
//! ## Features
//!
//! - **Webhook Verification**: HMAC signature check with a replay tolerance window
//! - **Idempotent Processing**: append-only processed-event ledger, unique
//!   constraint as the duplicate signal
//! - **Lifecycle State Machine**: checkout, update, deletion, and payment
//!   failure applied as idempotent full-state snapshots
//! - **Durable Retry**: failed events replayed on a fixed backoff schedule,
//!   terminal after five attempts

pub mod client;
pub mod error;
pub mod events;
pub mod failures;
pub mod ledger;
pub mod retry;
pub mod subscriptions;
pub mod tenants;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Client
pub use client::{StripeClient, StripeConfig, DEFAULT_SIGNATURE_TOLERANCE_SECS};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{
    CheckoutSession, EventEnvelope, InvoiceState, ProcessorEvent, SubscriptionState,
};

// Failures
pub use failures::{
    backoff_interval, eligible_for_retry, FailedEventRecord, FailedEventStore,
    MAX_RETRY_ATTEMPTS, RETRY_BACKOFF_MINUTES,
};

// Ledger
pub use ledger::ProcessedEventLedger;

// Retry
pub use retry::{RetryService, RetrySummary, DEFAULT_RETRY_BATCH_SIZE};

// Subscriptions
pub use subscriptions::{LifecycleService, PlanTier, SubscriptionStatus, Transition};

// Tenants
pub use tenants::TenantResolver;

// Webhooks
pub use webhooks::{verify_signature, WebhookHandler, WebhookOutcome};

use sqlx::PgPool;

/// Main billing service that combines the webhook pipeline components
pub struct BillingService {
    pub webhooks: WebhookHandler,
    pub retry: RetryService,
    pub failures: FailedEventStore,
    pub ledger: ProcessedEventLedger,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let client = StripeClient::from_env()?;
        Ok(Self::new(client, pool))
    }

    /// Create a new billing service with an explicit client
    pub fn new(client: StripeClient, pool: PgPool) -> Self {
        Self {
            webhooks: WebhookHandler::new(client.clone(), pool.clone()),
            retry: RetryService::new(client, pool.clone()),
            failures: FailedEventStore::new(pool.clone()),
            ledger: ProcessedEventLedger::new(pool),
        }
    }
}
