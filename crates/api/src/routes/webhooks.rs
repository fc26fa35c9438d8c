//! Webhook ingestion and retry routes

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Serialize;
use subtle::ConstantTimeEq;

use shopkit_billing::{FailedEventRecord, RetrySummary, WebhookOutcome, DEFAULT_RETRY_BATCH_SIZE};

use crate::error::ApiError;
use crate::state::AppState;

/// Acknowledgment returned for every accepted delivery, including
/// duplicates and unhandled event types
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

/// Handle Stripe webhook events
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let envelope = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Stripe webhook rejected");
            ApiError::BadRequest("Invalid webhook signature".to_string())
        })?;

    tracing::info!(
        event_id = %envelope.id,
        event_type = %envelope.event_type,
        "Stripe webhook event verified"
    );

    let outcome = state
        .billing
        .webhooks
        .handle_event(&envelope)
        .await
        .map_err(|e| {
            tracing::error!(event_id = %envelope.id, error = %e, "Webhook handling error");
            ApiError::Internal(format!("Webhook handling error: {e}"))
        })?;

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}

/// Run one retry batch over the failed-event store
pub async fn run_retry_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RetrySummary>, ApiError> {
    authorize(&headers, &state.config.retry_auth_token)?;

    let summary = state
        .billing
        .retry
        .run_batch(DEFAULT_RETRY_BATCH_SIZE)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Retry batch failed");
            ApiError::Internal(format!("Retry batch failed: {e}"))
        })?;

    Ok(Json(summary))
}

/// List failed events that exhausted their retries and need an operator
pub async fn list_terminal_failures(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<FailedEventRecord>>, ApiError> {
    authorize(&headers, &state.config.retry_auth_token)?;

    let records = state.billing.failures.list_terminal(100).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list terminal events");
        ApiError::Internal(format!("Failed to list terminal events: {e}"))
    })?;

    Ok(Json(records))
}

fn authorize(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    if !token_matches(token, expected) {
        tracing::warn!("Retry endpoint called with an invalid token");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Constant-time comparison: the token gates a mutating endpoint, so the
/// check must not leak prefix length through timing
fn token_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
