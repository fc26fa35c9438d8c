//! Typed webhook event payloads
//!
//! Stripe delivers events as loosely-typed JSON unions keyed by a type tag.
//! Each event kind the pipeline acts on is parsed into a tagged variant with
//! exactly the fields the state applier needs; a recognized type missing a
//! required field is a [`BillingError::MalformedEvent`], never a defensive
//! inline access. Unrecognized types parse to [`ProcessorEvent::Unknown`]
//! and are acknowledged without processing.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BillingError, BillingResult};

/// A verified webhook event, still carrying its full raw payload.
///
/// The raw payload is what the failure recorder persists for replay, so it
/// is kept alongside the parsed identity fields rather than re-serialized.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: String,
    pub event_type: String,
    pub created: i64,
    payload: Value,
}

impl EventEnvelope {
    /// Parse an envelope from a raw request body
    pub fn parse(body: &str) -> BillingResult<Self> {
        let payload: Value = serde_json::from_str(body)
            .map_err(|e| BillingError::MalformedEvent(format!("invalid event JSON: {e}")))?;
        Self::from_value(payload)
    }

    /// Parse an envelope from a stored payload (failed-event replay path)
    pub fn from_value(payload: Value) -> BillingResult<Self> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BillingError::MalformedEvent("event missing id".to_string()))?
            .to_string();
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BillingError::MalformedEvent("event missing type".to_string()))?
            .to_string();
        let created = payload.get("created").and_then(Value::as_i64).unwrap_or(0);

        Ok(Self {
            id,
            event_type,
            created,
            payload,
        })
    }

    /// Full raw event JSON, as delivered
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    fn object(&self) -> BillingResult<&Value> {
        self.payload
            .get("data")
            .and_then(|d| d.get("object"))
            .ok_or_else(|| BillingError::MalformedEvent("event missing data.object".to_string()))
    }
}

/// Checkout session fields consumed by the pipeline
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub mode: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_total: Option<i64>,
    pub metadata: HashMap<String, String>,
}

/// Subscription object fields consumed by the pipeline
///
/// Also produced by [`crate::client::StripeClient::fetch_subscription_state`]
/// when a checkout payload only carries the subscription id.
#[derive(Debug, Clone)]
pub struct SubscriptionState {
    pub subscription_id: String,
    pub customer_id: String,
    /// Processor-reported status string; mapped by the state applier
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub trial_end: Option<i64>,
    pub price_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Invoice fields consumed by the pipeline. Amounts are integer minor units.
#[derive(Debug, Clone)]
pub struct InvoiceState {
    pub invoice_id: String,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub amount_due: i64,
    pub attempt_count: i64,
}

/// A routed webhook event
#[derive(Debug, Clone)]
pub enum ProcessorEvent {
    CheckoutCompleted(CheckoutSession),
    SubscriptionUpdated(SubscriptionState),
    SubscriptionDeleted(SubscriptionState),
    InvoicePaymentFailed(InvoiceState),
    Unknown { event_type: String },
}

impl ProcessorEvent {
    /// Route an envelope by its type tag into a typed variant
    pub fn from_envelope(envelope: &EventEnvelope) -> BillingResult<Self> {
        match envelope.event_type.as_str() {
            "checkout.session.completed" => Ok(Self::CheckoutCompleted(
                CheckoutSession::from_object(envelope.object()?)?,
            )),
            "customer.subscription.updated" => Ok(Self::SubscriptionUpdated(
                SubscriptionState::from_object(envelope.object()?)?,
            )),
            "customer.subscription.deleted" => Ok(Self::SubscriptionDeleted(
                SubscriptionState::from_object(envelope.object()?)?,
            )),
            "invoice.payment_failed" => Ok(Self::InvoicePaymentFailed(
                InvoiceState::from_object(envelope.object()?)?,
            )),
            other => Ok(Self::Unknown {
                event_type: other.to_string(),
            }),
        }
    }

    pub fn type_tag(&self) -> &str {
        match self {
            Self::CheckoutCompleted(_) => "checkout.session.completed",
            Self::SubscriptionUpdated(_) => "customer.subscription.updated",
            Self::SubscriptionDeleted(_) => "customer.subscription.deleted",
            Self::InvoicePaymentFailed(_) => "invoice.payment_failed",
            Self::Unknown { event_type } => event_type,
        }
    }
}

/// Expandable references arrive either as a bare id string or an expanded
/// object with an `id` field
fn expandable_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(obj) => obj.get("id").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawCheckoutSession {
    id: Option<String>,
    mode: Option<String>,
    customer: Option<Value>,
    subscription: Option<Value>,
    amount_total: Option<i64>,
    metadata: Option<HashMap<String, String>>,
}

impl CheckoutSession {
    fn from_object(object: &Value) -> BillingResult<Self> {
        let raw: RawCheckoutSession = serde_json::from_value(object.clone())
            .map_err(|e| BillingError::MalformedEvent(format!("invalid checkout session: {e}")))?;

        let session_id = raw
            .id
            .ok_or_else(|| BillingError::MalformedEvent("checkout session missing id".to_string()))?;
        let mode = raw.mode.ok_or_else(|| {
            BillingError::MalformedEvent("checkout session missing mode".to_string())
        })?;

        Ok(Self {
            session_id,
            mode,
            customer_id: raw.customer.as_ref().and_then(expandable_id),
            subscription_id: raw.subscription.as_ref().and_then(expandable_id),
            amount_total: raw.amount_total,
            metadata: raw.metadata.unwrap_or_default(),
        })
    }

    pub fn is_subscription_mode(&self) -> bool {
        self.mode == "subscription"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSubscription {
    id: Option<String>,
    customer: Option<Value>,
    status: Option<String>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    trial_end: Option<i64>,
    metadata: Option<HashMap<String, String>>,
    items: Option<RawSubscriptionItems>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSubscriptionItems {
    #[serde(default)]
    data: Vec<RawSubscriptionItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSubscriptionItem {
    price: Option<RawPrice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawPrice {
    id: Option<String>,
}

impl SubscriptionState {
    fn from_object(object: &Value) -> BillingResult<Self> {
        let raw: RawSubscription = serde_json::from_value(object.clone())
            .map_err(|e| BillingError::MalformedEvent(format!("invalid subscription: {e}")))?;

        let subscription_id = raw
            .id
            .ok_or_else(|| BillingError::MalformedEvent("subscription missing id".to_string()))?;
        let customer_id = raw
            .customer
            .as_ref()
            .and_then(expandable_id)
            .ok_or_else(|| {
                BillingError::MalformedEvent("subscription missing customer".to_string())
            })?;
        let status = raw
            .status
            .ok_or_else(|| BillingError::MalformedEvent("subscription missing status".to_string()))?;

        let price_id = raw
            .items
            .and_then(|items| items.data.into_iter().next())
            .and_then(|item| item.price)
            .and_then(|price| price.id);

        Ok(Self {
            subscription_id,
            customer_id,
            status,
            current_period_start: raw.current_period_start,
            current_period_end: raw.current_period_end,
            trial_end: raw.trial_end,
            price_id,
            metadata: raw.metadata.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawInvoice {
    id: Option<String>,
    customer: Option<Value>,
    subscription: Option<Value>,
    amount_due: Option<i64>,
    attempt_count: Option<i64>,
}

impl InvoiceState {
    fn from_object(object: &Value) -> BillingResult<Self> {
        let raw: RawInvoice = serde_json::from_value(object.clone())
            .map_err(|e| BillingError::MalformedEvent(format!("invalid invoice: {e}")))?;

        let invoice_id = raw
            .id
            .ok_or_else(|| BillingError::MalformedEvent("invoice missing id".to_string()))?;
        let customer_id = raw
            .customer
            .as_ref()
            .and_then(expandable_id)
            .ok_or_else(|| BillingError::MalformedEvent("invoice missing customer".to_string()))?;

        Ok(Self {
            invoice_id,
            customer_id,
            subscription_id: raw.subscription.as_ref().and_then(expandable_id),
            amount_due: raw.amount_due.unwrap_or(0),
            attempt_count: raw.attempt_count.unwrap_or(0),
        })
    }
}
