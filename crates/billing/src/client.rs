//! Stripe client wrapper and billing configuration

use std::collections::HashMap;
use std::sync::Arc;

use stripe::{Expandable, SubscriptionStatus as StripeSubStatus};

use crate::error::{BillingError, BillingResult};
use crate::events::SubscriptionState;
use crate::subscriptions::PlanTier;

/// Seconds a webhook signature timestamp may differ from the server clock
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub signature_tolerance_secs: i64,
    /// Configured price id for each plan tier, used to map subscription
    /// items back to a tier when checkout metadata omits the plan
    price_tiers: HashMap<String, PlanTier>,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;

        let signature_tolerance_secs = std::env::var("WEBHOOK_TOLERANCE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SIGNATURE_TOLERANCE_SECS);

        let mut price_tiers = HashMap::new();
        for (var, tier) in [
            ("STRIPE_PRICE_STARTER", PlanTier::Starter),
            ("STRIPE_PRICE_PRO", PlanTier::Pro),
            ("STRIPE_PRICE_SCALE", PlanTier::Scale),
        ] {
            if let Ok(price_id) = std::env::var(var) {
                if !price_id.is_empty() {
                    price_tiers.insert(price_id, tier);
                }
            }
        }

        Ok(Self {
            secret_key,
            webhook_secret,
            signature_tolerance_secs,
            price_tiers,
        })
    }

    /// Look up the plan tier configured for a Stripe price id
    pub fn tier_for_price(&self, price_id: &str) -> Option<PlanTier> {
        self.price_tiers.get(price_id).copied()
    }

    #[cfg(test)]
    pub fn for_tests(webhook_secret: &str) -> Self {
        Self {
            secret_key: "sk_test_unused".to_string(),
            webhook_secret: webhook_secret.to_string(),
            signature_tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
            price_tiers: HashMap::from([
                ("price_starter_test".to_string(), PlanTier::Starter),
                ("price_pro_test".to_string(), PlanTier::Pro),
                ("price_scale_test".to_string(), PlanTier::Scale),
            ]),
        }
    }
}

/// Shared Stripe API client
///
/// Webhook payloads for checkout sessions are abbreviated; the client
/// retrieves the full subscription object when the pipeline needs billing
/// period bounds and the processor-reported status.
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    /// Retrieve a subscription from Stripe and flatten it into the shape the
    /// state applier consumes
    pub async fn fetch_subscription_state(
        &self,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionState> {
        let parsed_id: stripe::SubscriptionId = subscription_id.parse().map_err(|e| {
            BillingError::MalformedEvent(format!(
                "invalid subscription id {subscription_id}: {e}"
            ))
        })?;

        let subscription = stripe::Subscription::retrieve(&self.client, &parsed_id, &[]).await?;

        let customer_id = match &subscription.customer {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(customer) => customer.id.to_string(),
        };

        let status = match subscription.status {
            StripeSubStatus::Trialing => "trialing",
            StripeSubStatus::Active => "active",
            StripeSubStatus::PastDue => "past_due",
            StripeSubStatus::Canceled => "canceled",
            StripeSubStatus::Unpaid => "unpaid",
            StripeSubStatus::Incomplete => "incomplete",
            StripeSubStatus::IncompleteExpired => "incomplete_expired",
            _ => "unknown",
        };

        let price_id = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string());

        Ok(SubscriptionState {
            subscription_id: subscription.id.to_string(),
            customer_id,
            status: status.to_string(),
            current_period_start: Some(subscription.current_period_start),
            current_period_end: Some(subscription.current_period_end),
            trial_end: subscription.trial_end,
            price_id,
            metadata: subscription.metadata.clone(),
        })
    }
}
