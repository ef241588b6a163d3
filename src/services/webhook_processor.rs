//! Inbound payment webhook processing.
//!
//! # Pipeline
//!
//! 1. Verify the signature over the raw body
//! 2. Extract the provider transaction id and merchant reference
//! 3. Record `(provider, transaction id)` in the idempotency ledger; duplicates stop here
//! 4. Ask the provider for its own record of the transaction
//! 5. Confirm payment on the matching local order
//!
//! Once step 3 succeeds the ledger entry carries the outcome: `applied` and `discarded` are
//! terminal, `failed` may be re-applied by a later delivery until the attempt limit is hit.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::config::{Config, Secret};
use crate::db::traits::{OrderStore, WebhookLedger};
use crate::error::AppError;
use crate::models::order::OrderStatus;
use crate::models::webhook::{
    FlutterwaveWebhook, LedgerOutcome, LedgerStatus, NewWebhookEvent, PaystackWebhook,
    RetryPolicy, WebhookAck, WebhookSource,
};
use crate::services::order_status::{OrderStatusReconciler, PaymentConfirmation};
use crate::services::providers::{PaymentProvider, ProviderError};
use crate::services::signature::{self, SignatureError};

/// What happened to an accepted webhook. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { order_id: Uuid },
    Duplicate,
    /// Event type this service does not act on
    Ignored,
    /// Provider's record disagrees with the webhook body
    VerificationMismatch,
    OrderNotFound,
    /// Order had already left `pending`
    AlreadySettled(OrderStatus),
}

impl WebhookOutcome {
    pub fn ack(&self) -> WebhookAck {
        match self {
            WebhookOutcome::Duplicate => WebhookAck::duplicate(),
            _ => WebhookAck::received(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Verification call failed or timed out; the provider should retry.
    #[error("Transaction verification failed: {0}")]
    Provider(#[from] ProviderError),

    /// Order lookup or update failed after the event was recorded.
    #[error("Failed to apply payment: {0}")]
    Apply(AppError),

    /// The ledger itself is unavailable.
    #[error("Webhook ledger unavailable: {0}")]
    Ledger(AppError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookError::Ledger(e) => {
                tracing::error!("Webhook ledger error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Temporary failure, please retry".to_string(),
                )
            }
            WebhookError::Apply(e) if e.is_infrastructure() => (
                StatusCode::BAD_REQUEST,
                "Failed to apply payment, please retry".to_string(),
            ),
            _ => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

#[derive(Clone)]
pub struct PaymentWebhookProcessor {
    flutterwave_secret: Option<Secret>,
    paystack_secret: Option<Secret>,
    retry: RetryPolicy,
    ledger: Arc<dyn WebhookLedger>,
    orders: Arc<dyn OrderStore>,
    /// Keyed by the source each client reports
    providers: HashMap<WebhookSource, Arc<dyn PaymentProvider>>,
    reconciler: OrderStatusReconciler,
}

impl PaymentWebhookProcessor {
    pub fn new(
        config: &Config,
        ledger: Arc<dyn WebhookLedger>,
        orders: Arc<dyn OrderStore>,
        flutterwave: Arc<dyn PaymentProvider>,
        paystack: Arc<dyn PaymentProvider>,
        reconciler: OrderStatusReconciler,
    ) -> Self {
        Self {
            flutterwave_secret: config.flutterwave_signing_secret().cloned(),
            paystack_secret: config.paystack_signing_secret().cloned(),
            retry: RetryPolicy {
                max_attempts: config.webhook_max_attempts.max(1),
                recorded_lease: config.webhook_recorded_lease(),
            },
            ledger,
            orders,
            providers: [flutterwave, paystack]
                .into_iter()
                .map(|provider| (provider.source(), provider))
                .collect(),
            reconciler,
        }
    }

    pub async fn process_flutterwave(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        signature::verify_flutterwave(self.flutterwave_secret.as_ref(), headers, body)?;

        let payload: FlutterwaveWebhook = serde_json::from_slice(body)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        let transaction_id = payload
            .transaction_id()
            .ok_or_else(|| WebhookError::InvalidPayload("missing transaction id".to_string()))?;
        let tx_ref = payload
            .tx_ref()
            .ok_or_else(|| WebhookError::InvalidPayload("missing tx_ref".to_string()))?;

        let metadata = json!({ "event": payload.event });
        self.apply(WebhookSource::Flutterwave, transaction_id, tx_ref, metadata)
            .await
    }

    pub async fn process_paystack(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        signature::verify_paystack(self.paystack_secret.as_ref(), headers, body)?;

        let payload: PaystackWebhook = serde_json::from_slice(body)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        if payload.event != PaystackWebhook::CHARGE_SUCCESS {
            tracing::debug!(event = %payload.event, "Ignoring Paystack event");
            return Ok(WebhookOutcome::Ignored);
        }

        let transaction_id = payload
            .transaction_id()
            .or_else(|| payload.reference())
            .ok_or_else(|| WebhookError::InvalidPayload("missing transaction id".to_string()))?;
        let reference = payload
            .reference()
            .ok_or_else(|| WebhookError::InvalidPayload("missing reference".to_string()))?;

        let metadata = json!({ "event": payload.event });
        self.apply(WebhookSource::Paystack, transaction_id, reference, metadata)
            .await
    }

    #[tracing::instrument(skip_all, fields(%source, event_id = %transaction_id, %tx_ref))]
    async fn apply(
        &self,
        source: WebhookSource,
        transaction_id: String,
        tx_ref: String,
        metadata: serde_json::Value,
    ) -> Result<WebhookOutcome, WebhookError> {
        let event = NewWebhookEvent {
            source,
            event_id: transaction_id.clone(),
            tx_ref: Some(tx_ref.clone()),
            metadata,
        };
        let attempt = match self
            .ledger
            .record_if_new(event, self.retry)
            .await
            .map_err(WebhookError::Ledger)?
        {
            LedgerOutcome::Accepted { attempt } => attempt,
            LedgerOutcome::Duplicate => {
                tracing::info!("Duplicate webhook delivery");
                return Ok(WebhookOutcome::Duplicate);
            }
        };

        match self.confirm(source, &transaction_id, &tx_ref).await {
            Ok(outcome) => {
                let status = match outcome {
                    WebhookOutcome::Applied { .. } | WebhookOutcome::AlreadySettled(_) => {
                        LedgerStatus::Applied
                    }
                    _ => LedgerStatus::Discarded,
                };
                self.mark(source, &transaction_id, status, None).await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(attempt, "Webhook application failed: {}", e);
                self.mark(source, &transaction_id, LedgerStatus::Failed, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn confirm(
        &self,
        source: WebhookSource,
        transaction_id: &str,
        tx_ref: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let provider = self
            .providers
            .get(&source)
            .ok_or(ProviderError::NotConfigured(source))?;

        let verified = provider.verify_transaction(transaction_id).await?;
        if !verified.succeeded || verified.reference.as_deref() != Some(tx_ref) {
            tracing::warn!(
                provider_status = %verified.status,
                provider_reference = ?verified.reference,
                "Provider verification does not match webhook; leaving order untouched"
            );
            return Ok(WebhookOutcome::VerificationMismatch);
        }

        let Some(order) = self
            .orders
            .find_order_by_tx_ref(tx_ref)
            .await
            .map_err(WebhookError::Apply)?
        else {
            tracing::warn!("No order found for verified payment");
            return Ok(WebhookOutcome::OrderNotFound);
        };

        let confirmation = self
            .reconciler
            .confirm_payment(&order, source, transaction_id, tx_ref)
            .await
            .map_err(WebhookError::Apply)?;

        Ok(match confirmation {
            PaymentConfirmation::Confirmed(order) => {
                tracing::info!(order_number = %order.order_number, status = %order.status, "Payment confirmed");
                WebhookOutcome::Applied { order_id: order.id }
            }
            PaymentConfirmation::AlreadySettled(status) => {
                tracing::info!(order_number = %order.order_number, %status, "Order already settled");
                WebhookOutcome::AlreadySettled(status)
            }
            PaymentConfirmation::NotFound => {
                tracing::warn!("Order disappeared during payment confirmation");
                WebhookOutcome::OrderNotFound
            }
        })
    }

    async fn mark(
        &self,
        source: WebhookSource,
        event_id: &str,
        status: LedgerStatus,
        error: Option<String>,
    ) {
        if let Err(e) = self.ledger.mark(source, event_id, status, error).await {
            tracing::error!(status = status.as_str(), "Failed to update webhook ledger: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::http::HeaderValue;

    use super::*;
    use crate::db::memory::{MemoryStore, RecordingSink, TestOrder, item};
    use crate::models::order::{OrderMetadata, PaymentStatus};
    use crate::services::providers::{ScriptedProvider, VerifiedTransaction};
    use crate::services::signature::{
        FLUTTERWAVE_HASH_HEADER, PAYSTACK_SIGNATURE_HEADER, hmac_sha512_hex,
    };

    struct Harness {
        store: Arc<MemoryStore>,
        flutterwave: Arc<ScriptedProvider>,
        paystack: Arc<ScriptedProvider>,
        processor: PaymentWebhookProcessor,
    }

    fn harness(reference: &str) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let flutterwave = Arc::new(ScriptedProvider::succeeding(
            WebhookSource::Flutterwave,
            reference,
        ));
        let paystack = Arc::new(ScriptedProvider::succeeding(WebhookSource::Paystack, reference));
        let reconciler = OrderStatusReconciler::new(store.clone(), Arc::new(RecordingSink::default()));
        let processor = PaymentWebhookProcessor::new(
            &Config::for_tests(),
            store.clone(),
            store.clone(),
            flutterwave.clone(),
            paystack.clone(),
            reconciler,
        );
        Harness {
            store,
            flutterwave,
            paystack,
            processor,
        }
    }

    fn flw_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FLUTTERWAVE_HASH_HEADER, HeaderValue::from_static("flw-test-hash"));
        headers
    }

    fn paystack_headers(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let signature = hmac_sha512_hex("sk_test_paystack", body);
        headers.insert(PAYSTACK_SIGNATURE_HEADER, signature.parse().unwrap());
        headers
    }

    fn pending_order(store: &MemoryStore, tx_ref: &str) -> Uuid {
        store
            .insert_order(TestOrder::new(vec![item(Uuid::new_v4(), 10_000, 1)]).tx_ref(tx_ref))
            .id
    }

    const FLW_BODY: &[u8] = br#"{"event":"charge.completed","id":12345,"tx_ref":"ORD-1"}"#;

    #[tokio::test]
    async fn duplicate_flutterwave_delivery_mutates_once() {
        let h = harness("ORD-1");
        let order_id = pending_order(&h.store, "ORD-1");

        let first = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(first, WebhookOutcome::Applied { order_id });
        let after_first = h.store.order(order_id).unwrap();
        assert_eq!(after_first.status, OrderStatus::Completed);
        assert_eq!(after_first.payment_status, PaymentStatus::Confirmed);

        let second = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(second, WebhookOutcome::Duplicate);
        assert_eq!(second.ack(), WebhookAck::duplicate());

        assert_eq!(h.store.order(order_id).unwrap(), after_first);
        assert_eq!(h.flutterwave.calls(), 1);
        let event = h
            .store
            .find_event(WebhookSource::Flutterwave, "12345")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, LedgerStatus::Applied);
    }

    #[tokio::test]
    async fn concurrent_deliveries_pass_the_gate_once() {
        let h = harness("ORD-1");
        let order_id = pending_order(&h.store, "ORD-1");
        let headers = flw_headers();

        let (a, b) = tokio::join!(
            h.processor.process_flutterwave(&headers, FLW_BODY),
            h.processor.process_flutterwave(&headers, FLW_BODY),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        assert!(outcomes.contains(&WebhookOutcome::Duplicate));
        assert!(outcomes.contains(&WebhookOutcome::Applied { order_id }));
        assert_eq!(h.store.order(order_id).unwrap().status_history.len(), 2);
    }

    #[tokio::test]
    async fn tampered_signatures_are_never_applied() {
        let h = harness("ORD-1");
        let order_id = pending_order(&h.store, "ORD-1");

        let mut bad = HeaderMap::new();
        bad.insert(FLUTTERWAVE_HASH_HEADER, HeaderValue::from_static("guess"));
        let err = h.processor.process_flutterwave(&bad, FLW_BODY).await.unwrap_err();
        assert!(matches!(err, WebhookError::Signature(SignatureError::Mismatch)));

        let signed = br#"{"event":"charge.success","data":{"id":1,"reference":"ORD-1"}}"#;
        let tampered = br#"{"event":"charge.success","data":{"id":2,"reference":"ORD-1"}}"#;
        let err = h
            .processor
            .process_paystack(&paystack_headers(signed), tampered)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Signature(SignatureError::Mismatch)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        assert_eq!(h.store.ledger_len(), 0);
        assert_eq!(h.flutterwave.calls() + h.paystack.calls(), 0);
        assert_eq!(h.store.order(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn paystack_non_success_events_are_ignored() {
        let h = harness("ORD-1");
        let order_id = pending_order(&h.store, "ORD-1");
        let body = br#"{"event":"charge.failed","data":{"id":1,"reference":"ORD-1"}}"#;

        let outcome = h
            .processor
            .process_paystack(&paystack_headers(body), body)
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert_eq!(outcome.ack(), WebhookAck::received());
        assert_eq!(h.store.ledger_len(), 0);
        assert_eq!(h.store.order(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn paystack_charge_success_marks_order_paid() {
        let h = harness("ORD-7");
        let order_id = pending_order(&h.store, "ORD-7");
        let body = br#"{"event":"charge.success","data":{"id":302961,"reference":"ORD-7","status":"success"}}"#;

        let outcome = h
            .processor
            .process_paystack(&paystack_headers(body), body)
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Applied { order_id });
        let order = h.store.order(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.payment_confirmed_at.is_some());
    }

    #[tokio::test]
    async fn missing_identifiers_are_rejected_before_the_ledger() {
        let h = harness("ORD-1");
        let body = br#"{"event":"charge.completed","id":12345}"#;
        let err = h.processor.process_flutterwave(&flw_headers(), body).await.unwrap_err();
        assert!(matches!(err, WebhookError::InvalidPayload(_)));

        let err = h
            .processor
            .process_flutterwave(&flw_headers(), b"not json")
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidPayload(_)));
        assert_eq!(h.store.ledger_len(), 0);
    }

    #[tokio::test]
    async fn provider_disagreement_leaves_order_untouched() {
        let h = harness("SOMETHING-ELSE");
        let order_id = pending_order(&h.store, "ORD-1");

        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::VerificationMismatch);
        assert_eq!(h.store.order(order_id).unwrap().status, OrderStatus::Pending);

        let event = h
            .store
            .find_event(WebhookSource::Flutterwave, "12345")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, LedgerStatus::Discarded);

        // Discarded is terminal
        let again = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(again, WebhookOutcome::Duplicate);
    }

    #[tokio::test]
    async fn unsuccessful_provider_status_is_a_mismatch() {
        let h = harness("ORD-1");
        h.flutterwave.set_reply(Some(VerifiedTransaction {
            succeeded: false,
            status: "failed".to_string(),
            reference: Some("ORD-1".to_string()),
        }));
        let order_id = pending_order(&h.store, "ORD-1");

        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::VerificationMismatch);
        assert_eq!(h.store.order(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn failed_application_is_retried_on_redelivery() {
        let h = harness("ORD-1");
        let order_id = pending_order(&h.store, "ORD-1");
        h.flutterwave.set_reply(None);

        let err = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap_err();
        assert!(matches!(err, WebhookError::Provider(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        let event = h
            .store
            .find_event(WebhookSource::Flutterwave, "12345")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, LedgerStatus::Failed);
        assert!(event.last_error.is_some());

        h.flutterwave.set_reply(Some(VerifiedTransaction {
            succeeded: true,
            status: "successful".to_string(),
            reference: Some("ORD-1".to_string()),
        }));
        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied { order_id });

        let event = h
            .store
            .find_event(WebhookSource::Flutterwave, "12345")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, LedgerStatus::Applied);
        assert_eq!(event.attempts, 2);
    }

    #[tokio::test]
    async fn retries_stop_at_the_attempt_limit() {
        let h = harness("ORD-1");
        pending_order(&h.store, "ORD-1");
        h.flutterwave.set_reply(None);

        for _ in 0..3 {
            let result = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await;
            assert!(matches!(result, Err(WebhookError::Provider(_))));
        }
        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Duplicate);
        assert_eq!(h.flutterwave.calls(), 3);
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            recorded_lease: chrono::Duration::seconds(30),
        }
    }

    async fn record_in_flight(store: &MemoryStore) {
        store
            .record_if_new(
                NewWebhookEvent {
                    source: WebhookSource::Flutterwave,
                    event_id: "12345".to_string(),
                    tx_ref: Some("ORD-1".to_string()),
                    metadata: json!({}),
                },
                policy(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn in_flight_event_is_treated_as_duplicate() {
        let h = harness("ORD-1");
        pending_order(&h.store, "ORD-1");
        record_in_flight(&h.store).await;

        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Duplicate);
        assert_eq!(h.flutterwave.calls(), 0);
    }

    #[tokio::test]
    async fn abandoned_event_is_taken_over_after_the_lease() {
        let h = harness("ORD-1");
        let order_id = pending_order(&h.store, "ORD-1");
        // an earlier attempt crashed or lost the ledger before marking the outcome
        record_in_flight(&h.store).await;
        h.store
            .age_webhook_event(WebhookSource::Flutterwave, "12345", chrono::Duration::minutes(5));

        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied { order_id });
        assert_eq!(h.store.order(order_id).unwrap().status, OrderStatus::Completed);

        let event = h
            .store
            .find_event(WebhookSource::Flutterwave, "12345")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, LedgerStatus::Applied);
        assert_eq!(event.attempts, 2);
    }

    #[tokio::test]
    async fn abandoned_event_still_respects_the_attempt_limit() {
        let h = harness("ORD-1");
        let order_id = pending_order(&h.store, "ORD-1");
        h.flutterwave.set_reply(None);
        for _ in 0..2 {
            assert!(h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.is_err());
        }

        // third attempt claims the entry but never marks its outcome
        let claimed = h
            .store
            .record_if_new(
                NewWebhookEvent {
                    source: WebhookSource::Flutterwave,
                    event_id: "12345".to_string(),
                    tx_ref: Some("ORD-1".to_string()),
                    metadata: json!({}),
                },
                policy(),
            )
            .await
            .unwrap();
        assert_eq!(claimed, LedgerOutcome::Accepted { attempt: 3 });
        h.store
            .age_webhook_event(WebhookSource::Flutterwave, "12345", chrono::Duration::minutes(5));

        h.flutterwave.set_reply(Some(VerifiedTransaction {
            succeeded: true,
            status: "successful".to_string(),
            reference: Some("ORD-1".to_string()),
        }));
        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Duplicate);
        assert_eq!(h.store.order(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn paystack_event_without_id_is_keyed_by_reference() {
        let h = harness("ORD-9");
        let order_id = pending_order(&h.store, "ORD-9");
        let body = br#"{"event":"charge.success","data":{"reference":"ORD-9","status":"success"}}"#;

        let outcome = h
            .processor
            .process_paystack(&paystack_headers(body), body)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied { order_id });
        assert_eq!(h.paystack.calls(), 1);

        let event = h
            .store
            .find_event(WebhookSource::Paystack, "ORD-9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, LedgerStatus::Applied);

        let again = h
            .processor
            .process_paystack(&paystack_headers(body), body)
            .await
            .unwrap();
        assert_eq!(again, WebhookOutcome::Duplicate);
    }

    #[tokio::test]
    async fn client_for_another_provider_is_never_asked() {
        let store = Arc::new(MemoryStore::new());
        let order_id = pending_order(&store, "ORD-1");
        let flutterwave = Arc::new(ScriptedProvider::succeeding(WebhookSource::Flutterwave, "ORD-1"));
        // paystack slot wired to a second Flutterwave client
        let miswired = Arc::new(ScriptedProvider::succeeding(WebhookSource::Flutterwave, "ORD-1"));
        let processor = PaymentWebhookProcessor::new(
            &Config::for_tests(),
            store.clone(),
            store.clone(),
            flutterwave.clone(),
            miswired.clone(),
            OrderStatusReconciler::new(store.clone(), Arc::new(RecordingSink::default())),
        );
        let body = br#"{"event":"charge.success","data":{"id":5,"reference":"ORD-1"}}"#;

        let err = processor
            .process_paystack(&paystack_headers(body), body)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Provider(ProviderError::NotConfigured(WebhookSource::Paystack))
        ));
        assert_eq!(flutterwave.calls() + miswired.calls(), 0);
        assert_eq!(store.order(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn ledger_outage_is_a_server_error() {
        let h = harness("ORD-1");
        let order_id = pending_order(&h.store, "ORD-1");
        h.store.fail_ledger.store(true, Ordering::SeqCst);

        let err = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap_err();
        assert!(matches!(err, WebhookError::Ledger(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.store.order(order_id).unwrap().status, OrderStatus::Pending);
        assert_eq!(h.flutterwave.calls(), 0);
    }

    #[tokio::test]
    async fn order_write_failure_is_retryable() {
        let h = harness("ORD-1");
        pending_order(&h.store, "ORD-1");
        h.store.fail_order_writes.store(true, Ordering::SeqCst);

        let err = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap_err();
        assert!(matches!(err, WebhookError::Apply(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        h.store.fail_order_writes.store(false, Ordering::SeqCst);
        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn legacy_nested_reference_is_found() {
        let h = harness("LEGACY-1");
        let mut metadata = OrderMetadata::default();
        metadata
            .extra
            .insert("paymentDetails".to_string(), json!({ "tx_ref": "LEGACY-1" }));
        let order_id = h
            .store
            .insert_order(TestOrder::new(vec![item(Uuid::new_v4(), 500, 1)]).metadata(metadata))
            .id;

        let body = br#"{"event":"charge.completed","data":{"id":"999","tx_ref":"LEGACY-1"}}"#;
        let outcome = h.processor.process_flutterwave(&flw_headers(), body).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Applied { order_id });
    }

    #[tokio::test]
    async fn missing_local_order_is_still_acknowledged() {
        let h = harness("ORD-404");
        let body = br#"{"id":1,"tx_ref":"ORD-404"}"#;

        let outcome = h.processor.process_flutterwave(&flw_headers(), body).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::OrderNotFound);
        assert_eq!(outcome.ack(), WebhookAck::received());
    }

    #[tokio::test]
    async fn settled_order_is_not_reconfirmed() {
        let h = harness("ORD-1");
        let order = h.store.insert_order(
            TestOrder::new(vec![item(Uuid::new_v4(), 500, 1)])
                .tx_ref("ORD-1")
                .status(OrderStatus::Shipped),
        );

        let outcome = h.processor.process_flutterwave(&flw_headers(), FLW_BODY).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::AlreadySettled(OrderStatus::Shipped));
        assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::Shipped);
    }
}
