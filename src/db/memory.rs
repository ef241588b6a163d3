//! In-memory storage for tests.
//!
//! Mirrors the atomicity of the PostgreSQL implementation: every trait method runs under a
//! single lock acquisition and never awaits while holding it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use uuid::Uuid;

use crate::db::traits::{
    AdminKeyStore, HealthCheck, NotificationSink, OrderStore, PaymentPreferencesStore,
    SettingsStore, WebhookLedger,
};
use crate::error::AppError;
use crate::models::admin_key::AdminApiKey;
use crate::models::notification::NewNotification;
use crate::models::order::{
    Order, OrderItem, OrderMetadata, OrderNotification, OrderStatus, PaymentMethod,
    PaymentStatus, PayoutErrorEntry, StatusChange, StatusChangeResult, StatusHistoryEntry,
    TimelineEntry, VendorPayoutEntry,
};
use crate::models::payment_preferences::{
    CappedAppend, NewPayoutRecord, Payee, PayeeKind, PaymentPreferences, PayoutRecord,
    PayoutStatus,
};
use crate::models::settings::{CommissionRate, MarketplaceSettings};
use crate::models::webhook::{
    LedgerOutcome, LedgerStatus, NewWebhookEvent, RetryPolicy, WebhookEvent, WebhookSource,
};

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    webhook_events: HashMap<(WebhookSource, String), WebhookEvent>,
    preferences: HashMap<Payee, PaymentPreferences>,
    payouts: Vec<PayoutRecord>,
    settings: Option<MarketplaceSettings>,
    admin_keys: Vec<AdminApiKey>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Makes every ledger call fail like an unreachable database.
    pub fail_ledger: AtomicBool,
    /// Makes every order mutation fail like an unreachable database.
    pub fail_order_writes: AtomicBool,
    /// Makes payout history inserts fail like an unreachable database.
    pub fail_payout_writes: AtomicBool,
}

fn unavailable() -> AppError {
    AppError::Database(sqlx::Error::PoolTimedOut)
}

/// Builder-ish helper for test orders.
pub struct TestOrder {
    pub buyer_id: Uuid,
    pub items: Vec<OrderItem>,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub tx_ref: Option<String>,
    pub status: OrderStatus,
    pub metadata: OrderMetadata,
}

impl TestOrder {
    pub fn new(items: Vec<OrderItem>) -> Self {
        Self {
            buyer_id: Uuid::new_v4(),
            items,
            currency: "USD".to_string(),
            payment_method: PaymentMethod::Flutterwave,
            tx_ref: None,
            status: OrderStatus::Pending,
            metadata: OrderMetadata::default(),
        }
    }

    pub fn tx_ref(mut self, tx_ref: &str) -> Self {
        self.tx_ref = Some(tx_ref.to_string());
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn vendor_paid(mut self) -> Self {
        self.metadata.vendor_payout_processed = true;
        self
    }

    pub fn metadata(mut self, metadata: OrderMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// `ORD-` + base-36 timestamp + random suffix, uppercased.
fn order_number() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!("ORD-{}{}", to_base36(millis), suffix).to_uppercase()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

pub fn item(vendor_id: Uuid, unit_price_cents: i64, quantity: u32) -> OrderItem {
    OrderItem {
        product_id: Uuid::new_v4(),
        vendor_id,
        name: "Item".to_string(),
        unit_price_cents,
        currency: "USD".to_string(),
        quantity,
        is_nft: false,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: TestOrder) -> Order {
        let now = Utc::now();
        let total_amount_cents = order.items.iter().map(OrderItem::line_total_cents).sum();
        let order = Order {
            id: Uuid::new_v4(),
            order_number: order_number(),
            buyer_id: order.buyer_id,
            items: order.items,
            total_amount_cents,
            currency: order.currency,
            payment_method: order.payment_method,
            tx_ref: order.tx_ref,
            status: order.status,
            payment_status: PaymentStatus::Pending,
            payment_confirmed_at: None,
            tracking_number: None,
            carrier: None,
            estimated_delivery: None,
            shipped_by: None,
            shipped_at: None,
            delivered_by: None,
            delivered_at: None,
            cancellation_reason: None,
            refund_reason: None,
            status_history: vec![StatusHistoryEntry {
                status: order.status,
                timestamp: now,
                notes: Some("Order created".to_string()),
                actor: None,
            }],
            timeline: Vec::new(),
            notifications: Vec::new(),
            metadata: order.metadata,
            payout_claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().orders.insert(order.id, order.clone());
        order
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.lock().orders.get(&id).cloned()
    }

    pub fn put_preferences(&self, preferences: PaymentPreferences) {
        self.lock().preferences.insert(preferences.payee, preferences);
    }

    pub fn set_rate(&self, rate: CommissionRate) {
        self.lock().settings = Some(MarketplaceSettings {
            commission_rate: rate,
            updated_by: None,
            updated_at: Some(Utc::now()),
        });
    }

    pub fn add_admin_key(&self, key: AdminApiKey) {
        self.lock().admin_keys.push(key);
    }

    /// Pretend the ledger entry was last touched `by` earlier than it was.
    pub fn age_webhook_event(&self, source: WebhookSource, event_id: &str, by: chrono::Duration) {
        if let Some(event) = self
            .lock()
            .webhook_events
            .get_mut(&(source, event_id.to_string()))
        {
            event.updated_at -= by;
        }
    }

    pub fn ledger_len(&self) -> usize {
        self.lock().webhook_events.len()
    }

    pub fn payouts(&self) -> Vec<PayoutRecord> {
        self.lock().payouts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_order_writes(&self) -> Result<(), AppError> {
        if self.fail_order_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    fn check_payout_writes(&self) -> Result<(), AppError> {
        if self.fail_payout_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

fn push_payout(inner: &mut Inner, record: NewPayoutRecord) -> PayoutRecord {
    let record = PayoutRecord {
        id: inner.payouts.len() as i64 + 1,
        payee: record.payee,
        amount_cents: record.amount_cents,
        currency: record.currency,
        method: record.method,
        status: record.status,
        transaction_id: record.transaction_id,
        details: record.details,
        processed_at: Utc::now(),
    };
    inner.payouts.push(record.clone());
    record
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.order(id))
    }

    async fn find_order_by_tx_ref(&self, tx_ref: &str) -> Result<Option<Order>, AppError> {
        let inner = self.lock();
        let direct = inner
            .orders
            .values()
            .find(|o| o.tx_ref.as_deref() == Some(tx_ref));
        let found = direct.or_else(|| {
            inner
                .orders
                .values()
                .find(|o| o.metadata.legacy_tx_ref() == Some(tx_ref))
        });
        Ok(found.cloned())
    }

    async fn apply_status_change(
        &self,
        id: Uuid,
        change: StatusChange,
    ) -> Result<StatusChangeResult, AppError> {
        self.check_order_writes()?;
        let mut inner = self.lock();
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(StatusChangeResult::NotFound);
        };
        if order.status != change.expected {
            return Ok(StatusChangeResult::Conflict(order.status));
        }

        order.status = change.status;
        if let Some(status) = change.payment_status {
            order.payment_status = status;
        }
        order.payment_confirmed_at = change.payment_confirmed_at.or(order.payment_confirmed_at);
        order.tracking_number = change.tracking_number.or(order.tracking_number.take());
        order.carrier = change.carrier.or(order.carrier.take());
        order.estimated_delivery = change.estimated_delivery.or(order.estimated_delivery);
        order.shipped_by = change.shipped_by.or(order.shipped_by);
        order.shipped_at = change.shipped_at.or(order.shipped_at);
        order.delivered_by = change.delivered_by.or(order.delivered_by);
        order.delivered_at = change.delivered_at.or(order.delivered_at);
        order.cancellation_reason = change.cancellation_reason.or(order.cancellation_reason.take());
        order.refund_reason = change.refund_reason.or(order.refund_reason.take());
        order.status_history.push(change.history);
        order.timeline.push(change.timeline);
        order.updated_at = Utc::now();

        Ok(StatusChangeResult::Applied(Box::new(order.clone())))
    }

    async fn append_notification(
        &self,
        id: Uuid,
        entry: OrderNotification,
    ) -> Result<(), AppError> {
        if let Some(order) = self.lock().orders.get_mut(&id) {
            order.notifications.push(entry);
        }
        Ok(())
    }

    async fn claim_for_vendor_payout(
        &self,
        limit: i64,
        claim_ttl: chrono::Duration,
    ) -> Result<Vec<Order>, AppError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let mut claimed: Vec<Order> = Vec::new();
        let mut candidates: Vec<&mut Order> = inner
            .orders
            .values_mut()
            .filter(|o| o.status == OrderStatus::Completed && !o.metadata.vendor_payout_processed)
            .filter(|o| o.payout_claimed_at.is_none_or(|at| at < now - claim_ttl))
            .collect();
        candidates.sort_by_key(|o| o.updated_at);

        for order in candidates.into_iter().take(limit.max(0) as usize) {
            order.payout_claimed_at = Some(now);
            claimed.push(order.clone());
        }
        Ok(claimed)
    }

    async fn complete_vendor_payout(
        &self,
        id: Uuid,
        payouts: Vec<VendorPayoutEntry>,
        errors: Vec<PayoutErrorEntry>,
        timeline: Vec<TimelineEntry>,
    ) -> Result<(), AppError> {
        self.check_order_writes()?;
        if let Some(order) = self.lock().orders.get_mut(&id) {
            order.metadata.vendor_payout_processed = true;
            order.metadata.vendor_payouts.extend(payouts);
            order.metadata.payout_errors.extend(errors);
            order.timeline.extend(timeline);
            order.payout_claimed_at = None;
        }
        Ok(())
    }

    async fn release_payout_claim(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(order) = self.lock().orders.get_mut(&id) {
            order.payout_claimed_at = None;
        }
        Ok(())
    }

    async fn list_vendor_settled_orders(&self) -> Result<Vec<Order>, AppError> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Completed && o.metadata.vendor_payout_processed)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

#[async_trait]
impl WebhookLedger for MemoryStore {
    async fn record_if_new(
        &self,
        event: NewWebhookEvent,
        policy: RetryPolicy,
    ) -> Result<LedgerOutcome, AppError> {
        if self.fail_ledger.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut inner = self.lock();
        let key = (event.source, event.event_id.clone());
        if let Some(existing) = inner.webhook_events.get_mut(&key) {
            let reclaimable = match existing.status {
                LedgerStatus::Failed => true,
                LedgerStatus::Recorded => {
                    existing.updated_at < Utc::now() - policy.recorded_lease
                }
                LedgerStatus::Applied | LedgerStatus::Discarded => false,
            };
            if reclaimable && existing.attempts < policy.max_attempts {
                existing.status = LedgerStatus::Recorded;
                existing.attempts += 1;
                existing.updated_at = Utc::now();
                return Ok(LedgerOutcome::Accepted {
                    attempt: existing.attempts,
                });
            }
            return Ok(LedgerOutcome::Duplicate);
        }

        let now = Utc::now();
        inner.webhook_events.insert(
            key,
            WebhookEvent {
                id: Uuid::new_v4(),
                source: event.source,
                event_id: event.event_id,
                tx_ref: event.tx_ref,
                status: LedgerStatus::Recorded,
                attempts: 1,
                last_error: None,
                metadata: event.metadata,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(LedgerOutcome::Accepted { attempt: 1 })
    }

    async fn mark(
        &self,
        source: WebhookSource,
        event_id: &str,
        status: LedgerStatus,
        error: Option<String>,
    ) -> Result<(), AppError> {
        if self.fail_ledger.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        if let Some(event) = self
            .lock()
            .webhook_events
            .get_mut(&(source, event_id.to_string()))
        {
            event.status = status;
            event.last_error = error;
            event.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_event(
        &self,
        source: WebhookSource,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, AppError> {
        Ok(self
            .lock()
            .webhook_events
            .get(&(source, event_id.to_string()))
            .cloned())
    }
}

#[async_trait]
impl PaymentPreferencesStore for MemoryStore {
    async fn find_preferences(&self, payee: Payee) -> Result<Option<PaymentPreferences>, AppError> {
        Ok(self.lock().preferences.get(&payee).cloned())
    }

    async fn get_or_create_preferences(&self, payee: Payee) -> Result<PaymentPreferences, AppError> {
        Ok(self
            .lock()
            .preferences
            .entry(payee)
            .or_insert_with(|| PaymentPreferences::empty(payee))
            .clone())
    }

    async fn save_preferences(
        &self,
        preferences: &PaymentPreferences,
    ) -> Result<PaymentPreferences, AppError> {
        let mut saved = preferences.clone();
        saved.updated_at = Utc::now();
        self.lock().preferences.insert(saved.payee, saved.clone());
        Ok(saved)
    }

    async fn append_payout(&self, record: NewPayoutRecord) -> Result<PayoutRecord, AppError> {
        self.check_payout_writes()?;
        Ok(push_payout(&mut self.lock(), record))
    }

    async fn append_payout_within(
        &self,
        record: NewPayoutRecord,
        ceiling_cents: i64,
    ) -> Result<CappedAppend, AppError> {
        self.check_payout_writes()?;
        let mut inner = self.lock();
        let currency = record.currency.to_uppercase();
        let withdrawn_cents: i64 = inner
            .payouts
            .iter()
            .filter(|p| p.payee.kind == record.payee.kind && p.status != PayoutStatus::Failed)
            .filter(|p| p.currency.to_uppercase() == currency)
            .map(|p| p.amount_cents)
            .sum();
        if withdrawn_cents.saturating_add(record.amount_cents) > ceiling_cents {
            return Ok(CappedAppend::Exceeded { withdrawn_cents });
        }
        Ok(CappedAppend::Recorded(push_payout(&mut inner, record)))
    }

    async fn find_order_payout(
        &self,
        payee: Payee,
        order_id: Uuid,
    ) -> Result<Option<PayoutRecord>, AppError> {
        let order_id = order_id.to_string();
        Ok(self
            .lock()
            .payouts
            .iter()
            .rev()
            .filter(|p| p.payee == payee && p.status != PayoutStatus::Failed)
            .find(|p| p.details["context"]["orderId"].as_str() == Some(order_id.as_str()))
            .cloned())
    }

    async fn payout_history(&self, payee: Payee) -> Result<Vec<PayoutRecord>, AppError> {
        Ok(self
            .lock()
            .payouts
            .iter()
            .filter(|p| p.payee == payee)
            .cloned()
            .collect())
    }

    async fn list_payouts(
        &self,
        kind: Option<PayeeKind>,
        limit: i64,
    ) -> Result<Vec<PayoutRecord>, AppError> {
        Ok(self
            .lock()
            .payouts
            .iter()
            .rev()
            .filter(|p| kind.is_none_or(|k| p.payee.kind == k))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn marketplace_settings(&self) -> Result<MarketplaceSettings, AppError> {
        Ok(self.lock().settings.clone().unwrap_or_default())
    }

    async fn set_commission_rate(
        &self,
        rate: CommissionRate,
        updated_by: Uuid,
    ) -> Result<MarketplaceSettings, AppError> {
        let settings = MarketplaceSettings {
            commission_rate: rate,
            updated_by: Some(updated_by),
            updated_at: Some(Utc::now()),
        };
        self.lock().settings = Some(settings.clone());
        Ok(settings)
    }
}

#[async_trait]
impl AdminKeyStore for MemoryStore {
    async fn find_active_key(&self, key_hash: &str) -> Result<Option<AdminApiKey>, AppError> {
        Ok(self
            .lock()
            .admin_keys
            .iter()
            .find(|k| k.key_hash == key_hash && k.is_active)
            .cloned())
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Notification sink that records what it was asked to send.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<NewNotification>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<NewNotification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: NewNotification) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
        Ok(())
    }
}
