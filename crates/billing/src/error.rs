//! Billing error types

/// Result alias used throughout the billing crate
pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by the webhook pipeline and its stores
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Signature header missing, malformed, stale, or mismatched.
    /// Rejected before any processing; never recorded as a failed event.
    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    /// A recognized event type whose payload is missing a required field
    #[error("malformed event payload: {0}")]
    MalformedEvent(String),

    /// No tenant row matches the identifiers carried by the event
    #[error("no tenant found for event: {0}")]
    TenantNotFound(String),

    /// Processor-reported subscription status we do not recognize
    #[error("unknown subscription status: {0}")]
    UnknownStatus(String),

    /// Plan identifier or price id with no configured tier mapping
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Stripe API error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}
