//! Application state and HTTP router.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::traits::{
    AdminKeyStore, HealthCheck, NotificationSink, OrderStore, PaymentPreferencesStore,
    SettingsStore, WebhookLedger,
};
use crate::handlers;
use crate::middleware;
use crate::services::admin_commission::AdminCommissionService;
use crate::services::commission::CommissionCalculator;
use crate::services::order_status::OrderStatusReconciler;
use crate::services::payout::PayoutRouter;
use crate::services::preferences::PaymentPreferencesService;
use crate::services::providers::PaymentProvider;
use crate::services::vendor_payouts::VendorPayoutService;
use crate::services::webhook_processor::PaymentWebhookProcessor;

/// Shared state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<dyn HealthCheck>,
    pub admin_keys: Arc<dyn AdminKeyStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub calculator: CommissionCalculator,
    pub webhooks: Arc<PaymentWebhookProcessor>,
    pub reconciler: OrderStatusReconciler,
    pub payouts: PayoutRouter,
    pub vendor_payouts: Arc<VendorPayoutService>,
    pub commission: Arc<AdminCommissionService>,
    pub preferences: PaymentPreferencesService,
}

impl AppState {
    /// Wire every service against one store implementing all storage traits.
    pub fn new<S>(
        config: &Config,
        store: Arc<S>,
        notifications: Arc<dyn NotificationSink>,
        flutterwave: Arc<dyn PaymentProvider>,
        paystack: Arc<dyn PaymentProvider>,
    ) -> Self
    where
        S: OrderStore
            + WebhookLedger
            + PaymentPreferencesStore
            + SettingsStore
            + AdminKeyStore
            + HealthCheck
            + 'static,
    {
        let orders: Arc<dyn OrderStore> = store.clone();
        let preferences: Arc<dyn PaymentPreferencesStore> = store.clone();
        let settings: Arc<dyn SettingsStore> = store.clone();

        let calculator = CommissionCalculator::new(settings.clone());
        let reconciler = OrderStatusReconciler::new(orders.clone(), notifications.clone());
        let payouts = PayoutRouter::new(preferences.clone(), notifications);

        let webhooks = PaymentWebhookProcessor::new(
            config,
            store.clone(),
            orders.clone(),
            flutterwave,
            paystack,
            reconciler.clone(),
        );
        let vendor_payouts = VendorPayoutService::new(
            orders.clone(),
            payouts.clone(),
            calculator.clone(),
            config.payout_sweep_batch_size,
            config.payout_claim_ttl(),
        );
        let commission = AdminCommissionService::new(
            orders,
            preferences.clone(),
            calculator.clone(),
            payouts.clone(),
        );

        Self {
            health: store.clone(),
            admin_keys: store,
            settings,
            calculator,
            webhooks: Arc::new(webhooks),
            reconciler,
            payouts,
            vendor_payouts: Arc::new(vendor_payouts),
            commission: Arc::new(commission),
            preferences: PaymentPreferencesService::new(preferences),
        }
    }
}

/// Build the HTTP router.
///
/// - `/health` and the provider webhooks are public (webhooks authenticate by signature)
/// - everything under `/api/admin` requires an admin bearer key
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        // Payouts
        .route("/api/admin/payouts", get(handlers::payouts::list_payouts))
        .route(
            "/api/admin/payouts/process",
            post(handlers::payouts::process_vendor_payouts),
        )
        .route(
            "/api/admin/payouts/vendors/{vendor_id}",
            post(handlers::payouts::pay_vendor),
        )
        .route(
            "/api/admin/payouts/vendors/{vendor_id}/history",
            get(handlers::payouts::vendor_payout_history),
        )
        // Commission
        .route(
            "/api/admin/commission/report",
            get(handlers::commission::commission_report),
        )
        .route(
            "/api/admin/commission/total",
            get(handlers::commission::commission_total),
        )
        .route(
            "/api/admin/commission/split",
            get(handlers::commission::preview_split),
        )
        .route(
            "/api/admin/commission/withdraw",
            post(handlers::commission::withdraw_commission),
        )
        .route(
            "/api/admin/commission/history",
            get(handlers::commission::withdrawal_history),
        )
        // Payment preferences
        .route(
            "/api/admin/payment-preferences",
            get(handlers::preferences::get_admin_preferences)
                .put(handlers::preferences::update_admin_preferences),
        )
        .route(
            "/api/admin/vendors/{vendor_id}/payment-preferences",
            get(handlers::preferences::get_vendor_preferences)
                .put(handlers::preferences::update_vendor_preferences),
        )
        // Settings
        .route(
            "/api/admin/settings/commission-rate",
            get(handlers::settings::get_commission_rate)
                .put(handlers::settings::update_commission_rate),
        )
        // Orders
        .route(
            "/api/admin/orders/{id}/status",
            patch(handlers::orders::update_order_status),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/webhooks/flutterwave",
            post(handlers::webhooks::flutterwave_webhook),
        )
        .route(
            "/api/webhooks/paystack",
            post(handlers::webhooks::paystack_webhook),
        )
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::db::memory::{MemoryStore, RecordingSink, TestOrder, item};
    use crate::middleware::auth::hash_key;
    use crate::models::admin_key::AdminApiKey;
    use crate::models::order::OrderStatus;
    use crate::models::webhook::WebhookSource;
    use crate::services::providers::ScriptedProvider;
    use crate::services::signature::hmac_sha512_hex;

    const ADMIN_KEY: &str = "admin-test-key";
    const SUPPORT_KEY: &str = "support-test-key";

    fn setup() -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::new());
        for (key, role) in [(ADMIN_KEY, "admin"), (SUPPORT_KEY, "support")] {
            store.add_admin_key(AdminApiKey {
                id: Uuid::new_v4(),
                admin_id: Uuid::new_v4(),
                key_hash: hash_key(key),
                display_name: format!("{role} user"),
                role: role.to_string(),
                created_at: Utc::now(),
                is_active: true,
            });
        }
        let state = AppState::new(
            &Config::for_tests(),
            store.clone(),
            Arc::new(RecordingSink::default()),
            Arc::new(ScriptedProvider::succeeding(WebhookSource::Flutterwave, "ORD-1")),
            Arc::new(ScriptedProvider::succeeding(WebhookSource::Paystack, "ORD-1")),
        );
        (store, build_router(state))
    }

    fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {ADMIN_KEY}"));
        match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn health_is_public() {
        let (_, router) = setup();
        let (status, body) = send(
            &router,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn admin_routes_require_an_admin_key() {
        let (_, router) = setup();

        let anonymous = Request::builder()
            .uri("/api/admin/commission/total")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, anonymous).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let support = Request::builder()
            .uri("/api/admin/commission/total")
            .header("Authorization", format!("Bearer {SUPPORT_KEY}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&router, support).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            send(&router, admin_request("GET", "/api/admin/commission/total", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn flutterwave_webhook_acknowledges_duplicates() {
        let (store, router) = setup();
        let order = store.insert_order(TestOrder::new(vec![item(Uuid::new_v4(), 10_000, 1)]).tx_ref("ORD-1"));
        let webhook = || {
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/flutterwave")
                .header("verif-hash", "flw-test-hash")
                .body(Body::from(r#"{"id":12345,"tx_ref":"ORD-1"}"#))
                .unwrap()
        };

        let (status, body) = send(&router, webhook()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "received": true }));
        assert_eq!(store.order(order.id).unwrap().status, OrderStatus::Completed);

        let (status, body) = send(&router, webhook()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duplicate"], true);
    }

    #[tokio::test]
    async fn paystack_webhook_rejects_bad_signatures() {
        let (store, router) = setup();
        let body = r#"{"event":"charge.success","data":{"id":1,"reference":"ORD-1"}}"#;
        let request = Request::builder()
            .method("POST")
            .uri("/api/webhooks/paystack")
            .header("x-paystack-signature", hmac_sha512_hex("wrong-secret", body.as_bytes()))
            .body(Body::from(body))
            .unwrap();

        let (status, response) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["success"], false);
        assert_eq!(store.ledger_len(), 0);
    }

    #[tokio::test]
    async fn admin_updates_order_status() {
        let (store, router) = setup();
        let order = store.insert_order(TestOrder::new(vec![item(Uuid::new_v4(), 1_000, 1)]));
        let uri = format!("/api/admin/orders/{}/status", order.id);

        let (status, body) = send(
            &router,
            admin_request(
                "PATCH",
                &uri,
                Some(json!({ "status": "shipped", "trackingNumber": "1Z999" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "shipped");
        assert_eq!(body["data"]["trackingNumber"], "1Z999");

        let (status, body) = send(
            &router,
            admin_request("PATCH", &uri, Some(json!({ "status": "paid" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");

        let missing = format!("/api/admin/orders/{}/status", Uuid::new_v4());
        let (status, _) = send(
            &router,
            admin_request("PATCH", &missing, Some(json!({ "status": "processing" }))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn commission_rate_round_trip() {
        let (_, router) = setup();
        let (status, _) = send(
            &router,
            admin_request(
                "PUT",
                "/api/admin/settings/commission-rate",
                Some(json!({ "commissionRate": 0.12 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            &router,
            admin_request("GET", "/api/admin/settings/commission-rate", None),
        )
        .await;
        assert_eq!(body["data"]["commissionRate"], json!(0.12));

        let (status, body) = send(
            &router,
            admin_request(
                "GET",
                "/api/admin/commission/split?amountCents=999&currency=usd",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["commissionAmountCents"], 120);
        assert_eq!(body["data"]["vendorAmountCents"], 879);
        assert_eq!(body["data"]["currency"], "USD");
    }

    #[tokio::test]
    async fn withdrawal_beyond_available_commission_is_rejected() {
        let (store, router) = setup();
        store.insert_order(
            TestOrder::new(vec![item(Uuid::new_v4(), 10_000, 1)])
                .status(OrderStatus::Completed)
                .vendor_paid(),
        );

        let (status, body) = send(
            &router,
            admin_request(
                "PUT",
                "/api/admin/payment-preferences",
                Some(json!({
                    "paypal": { "enabled": true, "email": "finance@example.com" },
                    "defaultPaymentMethod": "paypal"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["defaultPaymentMethod"], "paypal");

        let (status, body) = send(
            &router,
            admin_request(
                "POST",
                "/api/admin/commission/withdraw",
                Some(json!({ "amountCents": 5_000, "currency": "USD" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "insufficient_commission");

        let (status, body) = send(
            &router,
            admin_request(
                "POST",
                "/api/admin/commission/withdraw",
                Some(json!({ "amountCents": 1_000, "currency": "USD" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "pending_manual");
    }

    #[tokio::test]
    async fn manual_sweep_pays_vendors() {
        let (store, router) = setup();
        let vendor_id = Uuid::new_v4();
        let (status, _) = send(
            &router,
            admin_request(
                "PUT",
                &format!("/api/admin/vendors/{vendor_id}/payment-preferences"),
                Some(json!({
                    "bankAccount": {
                        "enabled": true,
                        "accountHolderName": "Ada Stores",
                        "bankName": "GTBank",
                        "accountNumber": "0123456789",
                        "country": "NG"
                    },
                    "defaultPaymentMethod": "bankAccount"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        store.insert_order(
            TestOrder::new(vec![item(vendor_id, 20_000, 1)]).status(OrderStatus::Completed),
        );

        let (status, body) =
            send(&router, admin_request("POST", "/api/admin/payouts/process", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ordersProcessed"], 1);

        let (_, body) = send(
            &router,
            admin_request(
                "GET",
                &format!("/api/admin/payouts/vendors/{vendor_id}/history"),
                None,
            ),
        )
        .await;
        let history = body["data"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["amountCents"], 18_000);
        assert!(history[0]["transactionId"].as_str().unwrap().starts_with("BANK_"));
    }
}
