//! Subscription lifecycle state machine
//!
//! Every transition is an idempotent snapshot of processor-side state, not a
//! delta: the affected columns are overwritten wholesale, so replaying an
//! event or applying events out of arrival order leaves the tenant in the
//! state dictated by the last event processed. The events carry no sequence
//! numbers, so last-write-wins is the accepted behavior.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::events::{CheckoutSession, SubscriptionState};

/// Tenant subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Signup default; also reported by the processor during a trial period
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Map a processor-reported status onto the tenant lifecycle.
    ///
    /// `incomplete` (first payment not yet collected) is treated as past
    /// due; `unpaid` and `incomplete_expired` are dead subscriptions.
    pub fn from_processor(raw: &str) -> Option<Self> {
        match raw {
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" | "incomplete" => Some(SubscriptionStatus::PastDue),
            "canceled" | "unpaid" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Starter,
    Pro,
    Scale,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Scale => "scale",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "starter" => Some(PlanTier::Starter),
            "pro" => Some(PlanTier::Pro),
            "scale" => Some(PlanTier::Scale),
            _ => None,
        }
    }

    /// Orders the tenant may process per billing period
    pub fn monthly_transaction_limit(&self) -> i64 {
        match self {
            PlanTier::Starter => 500,
            PlanTier::Pro => 5_000,
            PlanTier::Scale => 50_000,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully-resolved state change, ready to persist.
///
/// Constructors validate the event payload up front so the persistence step
/// is a single row update with no partial-mutation window.
#[derive(Debug, Clone)]
pub enum Transition {
    CheckoutCompleted {
        customer_id: String,
        subscription_id: String,
        status: SubscriptionStatus,
        plan: PlanTier,
        transaction_limit: i64,
        period_start: Option<OffsetDateTime>,
        period_end: Option<OffsetDateTime>,
    },
    SubscriptionUpdated {
        status: SubscriptionStatus,
        period_start: Option<OffsetDateTime>,
        period_end: Option<OffsetDateTime>,
    },
    SubscriptionDeleted,
    PaymentFailed,
}

impl Transition {
    /// Build the checkout transition from the session event plus the full
    /// subscription object retrieved from the processor
    pub fn checkout_completed(
        session: &CheckoutSession,
        subscription: &SubscriptionState,
        config: &StripeConfig,
    ) -> BillingResult<Self> {
        let status = SubscriptionStatus::from_processor(&subscription.status)
            .ok_or_else(|| BillingError::UnknownStatus(subscription.status.clone()))?;

        let plan = resolve_plan(session, subscription, config)?;

        Ok(Transition::CheckoutCompleted {
            customer_id: subscription.customer_id.clone(),
            subscription_id: subscription.subscription_id.clone(),
            status,
            plan,
            transaction_limit: plan.monthly_transaction_limit(),
            period_start: period_timestamp(subscription.current_period_start),
            period_end: period_timestamp(subscription.current_period_end),
        })
    }

    pub fn subscription_updated(subscription: &SubscriptionState) -> BillingResult<Self> {
        let status = SubscriptionStatus::from_processor(&subscription.status)
            .ok_or_else(|| BillingError::UnknownStatus(subscription.status.clone()))?;

        Ok(Transition::SubscriptionUpdated {
            status,
            period_start: period_timestamp(subscription.current_period_start),
            period_end: period_timestamp(subscription.current_period_end),
        })
    }

    pub fn subscription_deleted() -> Self {
        Transition::SubscriptionDeleted
    }

    pub fn payment_failed() -> Self {
        Transition::PaymentFailed
    }

    /// Status the tenant holds after this transition applies
    pub fn status(&self) -> SubscriptionStatus {
        match self {
            Transition::CheckoutCompleted { status, .. } => *status,
            Transition::SubscriptionUpdated { status, .. } => *status,
            Transition::SubscriptionDeleted => SubscriptionStatus::Canceled,
            Transition::PaymentFailed => SubscriptionStatus::PastDue,
        }
    }
}

/// Plan resolution order: checkout metadata, subscription metadata, then the
/// configured price-id mapping
fn resolve_plan(
    session: &CheckoutSession,
    subscription: &SubscriptionState,
    config: &StripeConfig,
) -> BillingResult<PlanTier> {
    if let Some(raw) = session
        .metadata
        .get("plan")
        .or_else(|| subscription.metadata.get("plan"))
    {
        return PlanTier::from_str(raw).ok_or_else(|| BillingError::UnknownPlan(raw.clone()));
    }

    if let Some(price_id) = subscription.price_id.as_deref() {
        if let Some(tier) = config.tier_for_price(price_id) {
            return Ok(tier);
        }
        return Err(BillingError::UnknownPlan(price_id.to_string()));
    }

    Err(BillingError::UnknownPlan(
        "no plan metadata or price on subscription".to_string(),
    ))
}

/// Period bounds are unix seconds from the processor; out-of-range values
/// are treated as absent rather than aborting the event
fn period_timestamp(ts: Option<i64>) -> Option<OffsetDateTime> {
    ts.and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
}

/// Persists lifecycle transitions to the tenant billing record
pub struct LifecycleService {
    pool: PgPool,
}

impl LifecycleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply a transition to a tenant row.
    ///
    /// Each arm is one conditional UPDATE keyed on the tenant id, so the
    /// mutation is all-or-nothing per event. A zero-row update means the
    /// tenant disappeared between resolution and application, which is
    /// reported as a retryable failure.
    pub async fn apply(&self, tenant_id: Uuid, transition: &Transition) -> BillingResult<()> {
        let result = match transition {
            Transition::CheckoutCompleted {
                customer_id,
                subscription_id,
                status,
                plan,
                transaction_limit,
                period_start,
                period_end,
            } => {
                // COALESCE keeps an already-linked customer id: once set it
                // is never reassigned. Cross-tenant reuse is blocked by the
                // unique index on stripe_customer_id.
                sqlx::query(
                    r#"
                    UPDATE tenants
                    SET stripe_customer_id = COALESCE(stripe_customer_id, $2),
                        stripe_subscription_id = $3,
                        subscription_status = $4,
                        plan = $5,
                        transaction_limit = $6,
                        current_period_start = $7,
                        current_period_end = $8,
                        trial_ends_at = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(tenant_id)
                .bind(customer_id)
                .bind(subscription_id)
                .bind(status.as_str())
                .bind(plan.as_str())
                .bind(transaction_limit)
                .bind(period_start)
                .bind(period_end)
                .execute(&self.pool)
                .await?
            }
            Transition::SubscriptionUpdated {
                status,
                period_start,
                period_end,
            } => {
                sqlx::query(
                    r#"
                    UPDATE tenants
                    SET subscription_status = $2,
                        current_period_start = $3,
                        current_period_end = $4,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(tenant_id)
                .bind(status.as_str())
                .bind(period_start)
                .bind(period_end)
                .execute(&self.pool)
                .await?
            }
            Transition::SubscriptionDeleted => {
                sqlx::query(
                    r#"
                    UPDATE tenants
                    SET subscription_status = 'canceled',
                        stripe_subscription_id = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(tenant_id)
                .execute(&self.pool)
                .await?
            }
            Transition::PaymentFailed => {
                sqlx::query(
                    r#"
                    UPDATE tenants
                    SET subscription_status = 'past_due',
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(tenant_id)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(BillingError::TenantNotFound(tenant_id.to_string()));
        }

        Ok(())
    }
}
