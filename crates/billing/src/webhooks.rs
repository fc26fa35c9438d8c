//! Stripe webhook handling
//!
//! Receives signed processor events and drives them through verification,
//! the idempotency ledger, routing, tenant resolution, and the lifecycle
//! state applier. Any error after verification lands the event in the
//! failed-event store for the retry scheduler.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{
    CheckoutSession, EventEnvelope, InvoiceState, ProcessorEvent, SubscriptionState,
};
use crate::failures::FailedEventStore;
use crate::ledger::ProcessedEventLedger;
use crate::subscriptions::{LifecycleService, SubscriptionStatus, Transition};
use crate::tenants::TenantResolver;

type HmacSha256 = Hmac<Sha256>;

/// How a delivery was disposed of; all three are acknowledged with 200
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

/// Verify a raw webhook body against its signature header.
///
/// The header format is `t=<unix>,v1=<hex hmac>`; the signed payload is
/// `"{t}.{body}"` keyed with the webhook secret (any `whsec_` prefix
/// stripped). Timestamps outside the tolerance window are rejected to block
/// replayed captures. Fails closed: the body of a rejected request is
/// discarded, never persisted.
pub fn verify_signature(
    payload: &str,
    signature: &str,
    secret: &str,
    tolerance_secs: i64,
) -> BillingResult<EventEnvelope> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::warn!("Missing timestamp in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::warn!("Missing v1 signature in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            tracing::error!("System time error: {}", e);
            BillingError::WebhookSignatureInvalid
        })?
        .as_secs() as i64;

    if (now - timestamp).abs() > tolerance_secs {
        tracing::warn!(
            timestamp = timestamp,
            now = now,
            diff = (now - timestamp).abs(),
            "Webhook timestamp outside tolerance window"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::warn!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    EventEnvelope::parse(payload)
}

/// Webhook pipeline for Stripe events
pub struct WebhookHandler {
    client: StripeClient,
    ledger: ProcessedEventLedger,
    resolver: TenantResolver,
    lifecycle: LifecycleService,
    failures: FailedEventStore,
}

impl WebhookHandler {
    pub fn new(client: StripeClient, pool: PgPool) -> Self {
        Self {
            client,
            ledger: ProcessedEventLedger::new(pool.clone()),
            resolver: TenantResolver::new(pool.clone()),
            lifecycle: LifecycleService::new(pool.clone()),
            failures: FailedEventStore::new(pool),
        }
    }

    /// Verify and parse an inbound delivery
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<EventEnvelope> {
        let config = self.client.config();
        verify_signature(
            payload,
            signature,
            &config.webhook_secret,
            config.signature_tolerance_secs,
        )
    }

    /// Drive a verified event through the pipeline.
    ///
    /// The ledger is checked before dispatch and written after success; the
    /// unique constraint on the final insert closes the window where two
    /// deliveries of the same id are in flight at once. Any dispatch error
    /// is converted into a failed-event record before it propagates.
    pub async fn handle_event(&self, envelope: &EventEnvelope) -> BillingResult<WebhookOutcome> {
        if self.ledger.has_processed(&envelope.id).await? {
            tracing::info!(
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                "Duplicate webhook event, already processed"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let event = match ProcessorEvent::from_envelope(envelope) {
            Ok(event) => event,
            Err(e) => {
                self.record_failure(envelope, &e).await;
                return Err(e);
            }
        };

        if let ProcessorEvent::Unknown { event_type } = &event {
            // Acknowledged as a no-op so the processor stops redelivering
            // event types we do not handle
            tracing::info!(
                event_id = %envelope.id,
                event_type = %event_type,
                "Unhandled event type, acknowledged without processing"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        tracing::info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            "Processing webhook event"
        );

        let result = match self.process_event(&event).await {
            Ok(()) => self
                .ledger
                .mark_processed(&envelope.id, event.type_tag())
                .await
                .map(|inserted| {
                    if !inserted {
                        tracing::info!(
                            event_id = %envelope.id,
                            "Concurrent delivery of the same event committed first"
                        );
                    }
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(WebhookOutcome::Processed),
            Err(e) => {
                self.record_failure(envelope, &e).await;
                Err(e)
            }
        }
    }

    /// Route a typed event to its handler. Shared by the live pipeline and
    /// the retry scheduler's replay path.
    pub(crate) async fn process_event(&self, event: &ProcessorEvent) -> BillingResult<()> {
        match event {
            ProcessorEvent::CheckoutCompleted(session) => {
                self.handle_checkout_completed(session).await
            }
            ProcessorEvent::SubscriptionUpdated(state) => {
                self.handle_subscription_updated(state).await
            }
            ProcessorEvent::SubscriptionDeleted(state) => {
                self.handle_subscription_deleted(state).await
            }
            ProcessorEvent::InvoicePaymentFailed(invoice) => {
                self.handle_invoice_payment_failed(invoice).await
            }
            ProcessorEvent::Unknown { event_type } => {
                tracing::info!(event_type = %event_type, "No handler configured for event type");
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(&self, session: &CheckoutSession) -> BillingResult<()> {
        if !session.is_subscription_mode() {
            tracing::info!(
                session_id = %session.session_id,
                mode = %session.mode,
                "Ignoring non-subscription checkout session"
            );
            return Ok(());
        }

        let tenant_id = match self
            .resolver
            .resolve(&session.metadata, session.customer_id.as_deref())
            .await?
        {
            Some(id) => id,
            None => {
                // Unlike the other handlers this is acknowledged, not
                // retried: a session with no tenant metadata and no matching
                // customer may never have a tenant to resolve to
                tracing::info!(
                    session_id = %session.session_id,
                    customer_id = ?session.customer_id,
                    "Checkout session matches no tenant, acknowledged without processing"
                );
                return Ok(());
            }
        };

        let subscription_id = session.subscription_id.as_deref().ok_or_else(|| {
            BillingError::MalformedEvent(
                "subscription-mode checkout session missing subscription id".to_string(),
            )
        })?;

        // Checkout payloads are abbreviated; the subscription object carries
        // the status and billing period the applier needs
        let subscription = self.client.fetch_subscription_state(subscription_id).await?;

        let transition =
            Transition::checkout_completed(session, &subscription, self.client.config())?;
        self.lifecycle.apply(tenant_id, &transition).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %subscription.subscription_id,
            status = %transition.status(),
            amount_total_cents = ?session.amount_total,
            "Checkout completed, subscription synced"
        );

        Ok(())
    }

    async fn handle_subscription_updated(&self, state: &SubscriptionState) -> BillingResult<()> {
        let tenant_id = self
            .resolver
            .resolve(&state.metadata, Some(&state.customer_id))
            .await?
            .ok_or_else(|| BillingError::TenantNotFound(state.customer_id.clone()))?;

        let transition = Transition::subscription_updated(state)?;
        self.lifecycle.apply(tenant_id, &transition).await?;

        if transition.status() == SubscriptionStatus::PastDue {
            tracing::warn!(
                tenant_id = %tenant_id,
                subscription_id = %state.subscription_id,
                "Subscription is past due"
            );
        }

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %state.subscription_id,
            status = %transition.status(),
            "Subscription updated"
        );

        Ok(())
    }

    async fn handle_subscription_deleted(&self, state: &SubscriptionState) -> BillingResult<()> {
        let tenant_id = self
            .resolver
            .resolve(&state.metadata, Some(&state.customer_id))
            .await?
            .ok_or_else(|| BillingError::TenantNotFound(state.customer_id.clone()))?;

        self.lifecycle
            .apply(tenant_id, &Transition::subscription_deleted())
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %state.subscription_id,
            "Subscription deleted, tenant canceled"
        );

        Ok(())
    }

    async fn handle_invoice_payment_failed(&self, invoice: &InvoiceState) -> BillingResult<()> {
        let tenant_id = self
            .resolver
            .resolve_customer(&invoice.customer_id)
            .await?
            .ok_or_else(|| BillingError::TenantNotFound(invoice.customer_id.clone()))?;

        self.lifecycle
            .apply(tenant_id, &Transition::payment_failed())
            .await?;

        tracing::warn!(
            tenant_id = %tenant_id,
            invoice_id = %invoice.invoice_id,
            amount_due_cents = invoice.amount_due,
            attempt_count = invoice.attempt_count,
            "Invoice payment failed, tenant marked past due"
        );

        Ok(())
    }

    /// Best-effort failure record. If this write also fails the event has no
    /// durable trace, so it is logged at error severity as an operational
    /// alert.
    async fn record_failure(&self, envelope: &EventEnvelope, error: &BillingError) {
        if let Err(record_err) = self.failures.record(envelope, &error.to_string()).await {
            tracing::error!(
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                processing_error = %error,
                record_error = %record_err,
                "CRITICAL: Failed to persist failed webhook event. \
                 No durable record of this delivery exists; recovery depends \
                 on processor-side redelivery. Manual intervention may be required."
            );
        } else {
            tracing::warn!(
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                error = %error,
                "Webhook event failed, recorded for retry"
            );
        }
    }
}
