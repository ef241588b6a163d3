//! Payment provider webhook receivers.
//!
//! The body is taken as raw bytes: signatures are computed over the exact bytes the provider
//! sent, so it must not be parsed before verification.
//!
//! # Responses
//!
//! - 200 `{"success": true, "received": true}` once the event is recorded (or ignored)
//! - 200 `{"success": true, "received": true, "duplicate": true}` for redeliveries
//! - 400 `{"success": false, "message": ...}` for bad signatures, bad payloads and
//!   failures the provider should retry
//! - 500 when the idempotency ledger is unavailable

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};

use crate::app::AppState;
use crate::models::webhook::WebhookAck;
use crate::services::webhook_processor::WebhookError;

/// `POST /api/webhooks/flutterwave`
///
/// Authenticated by `verif-hash` (exact match) or `flutterwave-signature` (HMAC-SHA256).
#[tracing::instrument(skip_all, fields(provider = "flutterwave"))]
pub async fn flutterwave_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let outcome = state.webhooks.process_flutterwave(&headers, &body).await?;
    tracing::debug!(?outcome, "Flutterwave webhook handled");
    Ok(Json(outcome.ack()))
}

/// `POST /api/webhooks/paystack`
///
/// Authenticated by `x-paystack-signature` (HMAC-SHA512). Only `charge.success` is acted on.
#[tracing::instrument(skip_all, fields(provider = "paystack"))]
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let outcome = state.webhooks.process_paystack(&headers, &body).await?;
    tracing::debug!(?outcome, "Paystack webhook handled");
    Ok(Json(outcome.ack()))
}
