//! Storage seams.
//!
//! Services depend on these traits rather than on the pool, so the core can be exercised
//! against in-memory stores. Implementations must make each method atomic on its own;
//! callers never hold locks across calls.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::admin_key::AdminApiKey;
use crate::models::notification::NewNotification;
use crate::models::order::{
    Order, OrderNotification, PayoutErrorEntry, StatusChange, StatusChangeResult, TimelineEntry,
    VendorPayoutEntry,
};
use crate::models::payment_preferences::{
    CappedAppend, NewPayoutRecord, Payee, PayeeKind, PaymentPreferences, PayoutRecord,
};
use crate::models::settings::{CommissionRate, MarketplaceSettings};
use crate::models::webhook::{
    LedgerOutcome, LedgerStatus, NewWebhookEvent, RetryPolicy, WebhookEvent, WebhookSource,
};

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, AppError>;

    /// Finds an order by its provider reference, falling back to the legacy
    /// `metadata.paymentDetails.tx_ref` location.
    async fn find_order_by_tx_ref(&self, tx_ref: &str) -> Result<Option<Order>, AppError>;

    /// Compare-and-set status change: applies only if the order is still in
    /// `change.expected`, appending one status history and one timeline entry.
    async fn apply_status_change(
        &self,
        id: Uuid,
        change: StatusChange,
    ) -> Result<StatusChangeResult, AppError>;

    async fn append_notification(
        &self,
        id: Uuid,
        entry: OrderNotification,
    ) -> Result<(), AppError>;

    /// Atomically reserves up to `limit` completed orders whose vendors have not been paid.
    /// Orders claimed longer ago than `claim_ttl` are considered abandoned and may be reclaimed.
    async fn claim_for_vendor_payout(
        &self,
        limit: i64,
        claim_ttl: chrono::Duration,
    ) -> Result<Vec<Order>, AppError>;

    /// Records payout results, sets `vendorPayoutProcessed` and releases the claim.
    async fn complete_vendor_payout(
        &self,
        id: Uuid,
        payouts: Vec<VendorPayoutEntry>,
        errors: Vec<PayoutErrorEntry>,
        timeline: Vec<TimelineEntry>,
    ) -> Result<(), AppError>;

    async fn release_payout_claim(&self, id: Uuid) -> Result<(), AppError>;

    /// Completed orders whose vendor payouts have been processed.
    async fn list_vendor_settled_orders(&self) -> Result<Vec<Order>, AppError>;
}

/// Idempotency ledger for inbound webhooks.
#[async_trait]
pub trait WebhookLedger: Send + Sync {
    /// Inserts `(source, event_id)`. The insert relies on the unique constraint, never on a
    /// prior read. An existing entry with fewer than `policy.max_attempts` attempts is
    /// atomically re-claimed instead when it is `failed`, or `recorded` and older than
    /// `policy.recorded_lease`.
    async fn record_if_new(
        &self,
        event: NewWebhookEvent,
        policy: RetryPolicy,
    ) -> Result<LedgerOutcome, AppError>;

    async fn mark(
        &self,
        source: WebhookSource,
        event_id: &str,
        status: LedgerStatus,
        error: Option<String>,
    ) -> Result<(), AppError>;

    async fn find_event(
        &self,
        source: WebhookSource,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, AppError>;
}

#[async_trait]
pub trait PaymentPreferencesStore: Send + Sync {
    async fn find_preferences(&self, payee: Payee) -> Result<Option<PaymentPreferences>, AppError>;

    /// Returns the payee's document, creating an empty one on first access.
    async fn get_or_create_preferences(&self, payee: Payee) -> Result<PaymentPreferences, AppError>;

    async fn save_preferences(
        &self,
        preferences: &PaymentPreferences,
    ) -> Result<PaymentPreferences, AppError>;

    /// Insert-only append to the payout ledger.
    async fn append_payout(&self, record: NewPayoutRecord) -> Result<PayoutRecord, AppError>;

    /// Appends `record` only while the non-failed payouts to its payee kind in its currency,
    /// this one included, stay within `ceiling_cents`. The sum and the insert are atomic
    /// across every writer.
    async fn append_payout_within(
        &self,
        record: NewPayoutRecord,
        ceiling_cents: i64,
    ) -> Result<CappedAppend, AppError>;

    /// Latest payout to `payee` that did not fail and carries `order_id` in its context.
    async fn find_order_payout(
        &self,
        payee: Payee,
        order_id: Uuid,
    ) -> Result<Option<PayoutRecord>, AppError>;

    /// Oldest first.
    async fn payout_history(&self, payee: Payee) -> Result<Vec<PayoutRecord>, AppError>;

    /// Newest first.
    async fn list_payouts(
        &self,
        kind: Option<PayeeKind>,
        limit: i64,
    ) -> Result<Vec<PayoutRecord>, AppError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Defaults apply when the record does not exist.
    async fn marketplace_settings(&self) -> Result<MarketplaceSettings, AppError>;

    async fn set_commission_rate(
        &self,
        rate: CommissionRate,
        updated_by: Uuid,
    ) -> Result<MarketplaceSettings, AppError>;
}

/// Delivery of user-facing notifications. Callers treat failures as best-effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: NewNotification) -> Result<(), AppError>;
}

#[async_trait]
pub trait AdminKeyStore: Send + Sync {
    async fn find_active_key(&self, key_hash: &str) -> Result<Option<AdminApiKey>, AppError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;
}
