//! Order data models.
//!
//! Orders are created by the checkout flow and only ever mutated here through status
//! transitions and payout bookkeeping. They are never deleted: `cancelled` and
//! `refunded` are soft terminal states.
//!
//! Amounts are stored as `i64` cents, the same as every other amount in this service.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle.
///
/// `pending → paid/completed → processing → shipped → delivered → completed`, with
/// `cancelled` and `refunded` reachable from most non-terminal states. `paid` is only ever
/// set by a Paystack payment confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// The seven values an admin or vendor may set explicitly.
    pub const SETTABLE: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn is_settable(&self) -> bool {
        Self::SETTABLE.contains(self)
    }

    /// Absorbing states: nothing leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Whether an explicit status update may move an order from `self` to `next`.
    ///
    /// Re-setting the current status is allowed so shipping details can be amended.
    /// A completed order can only be refunded.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if !next.is_settable() || self.is_terminal() {
            return false;
        }
        match self {
            OrderStatus::Completed => matches!(next, OrderStatus::Completed | OrderStatus::Refunded),
            _ => true,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("Invalid order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "confirmed" => Ok(PaymentStatus::Confirmed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("Invalid payment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Flutterwave,
    Paystack,
    Crypto,
    Nft,
    MobileMoney,
    AirtelMoney,
    CashOnDelivery,
    CardPayment,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Flutterwave => "flutterwave",
            PaymentMethod::Paystack => "paystack",
            PaymentMethod::Crypto => "crypto",
            PaymentMethod::Nft => "nft",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::AirtelMoney => "airtel_money",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
            PaymentMethod::CardPayment => "card_payment",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flutterwave" => Ok(PaymentMethod::Flutterwave),
            "paystack" => Ok(PaymentMethod::Paystack),
            "crypto" => Ok(PaymentMethod::Crypto),
            "nft" => Ok(PaymentMethod::Nft),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "airtel_money" => Ok(PaymentMethod::AirtelMoney),
            "cash_on_delivery" => Ok(PaymentMethod::CashOnDelivery),
            "card_payment" => Ok(PaymentMethod::CardPayment),
            other => Err(format!("Invalid payment method: {other}")),
        }
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    /// Vendor that sells this product; used for payout splitting and notification fan-out.
    pub vendor_id: Uuid,
    pub name: String,
    pub unit_price_cents: i64,
    pub currency: String,
    /// Always at least 1
    pub quantity: u32,
    #[serde(default)]
    pub is_nft: bool,
}

impl OrderItem {
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// A status transition, appended once per status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
    /// User who made the change, `None` for system-driven changes (webhooks, sweeps)
    pub actor: Option<Uuid>,
}

/// Any order event, including payout attempts. Finer grained than the status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl TimelineEntry {
    pub fn now(event: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now(),
            details,
        }
    }
}

/// Record of a notification sent about this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotification {
    pub recipient_id: Uuid,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Result of paying one vendor for their share of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorPayoutEntry {
    pub vendor_id: Uuid,
    pub gross_cents: i64,
    pub vendor_amount_cents: i64,
    pub commission_cents: i64,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub transaction_id: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutErrorEntry {
    pub vendor_id: Uuid,
    pub amount_cents: i64,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

/// Free-form metadata bag. Known keys are typed, everything else is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    #[serde(default)]
    pub vendor_payout_processed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vendor_payouts: Vec<VendorPayoutEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payout_errors: Vec<PayoutErrorEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OrderMetadata {
    /// Transaction reference stored by older checkout code under `paymentDetails.tx_ref`.
    pub fn legacy_tx_ref(&self) -> Option<&str> {
        self.extra
            .get("paymentDetails")
            .and_then(|details| details.get("tx_ref"))
            .and_then(|v| v.as_str())
    }
}

/// A buyer's purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub items: Vec<OrderItem>,
    pub total_amount_cents: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    /// Provider transaction reference used to correlate webhooks with this order
    pub tx_ref: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub shipped_by: Option<Uuid>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_by: Option<Uuid>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub refund_reason: Option<String>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub timeline: Vec<TimelineEntry>,
    pub notifications: Vec<OrderNotification>,
    pub metadata: OrderMetadata,
    #[serde(skip)]
    pub payout_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Distinct vendors in item order, each listed once.
    pub fn vendor_ids(&self) -> Vec<Uuid> {
        let mut vendors: Vec<Uuid> = Vec::new();
        for item in &self.items {
            if !vendors.contains(&item.vendor_id) {
                vendors.push(item.vendor_id);
            }
        }
        vendors
    }

    /// Gross amount owed per vendor, in item order.
    pub fn gross_by_vendor(&self) -> Vec<(Uuid, i64)> {
        self.vendor_ids()
            .into_iter()
            .map(|vendor_id| {
                let gross = self
                    .items
                    .iter()
                    .filter(|item| item.vendor_id == vendor_id)
                    .map(OrderItem::line_total_cents)
                    .sum();
                (vendor_id, gross)
            })
            .collect()
    }

    pub fn items_total_cents(&self) -> i64 {
        self.items.iter().map(OrderItem::line_total_cents).sum()
    }
}

/// Everything a status update writes, applied by the store in one atomic statement.
///
/// `expected` is the status the caller based its decision on; the store refuses the change
/// if the order moved in the meantime.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub expected: OrderStatus,
    pub status: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub shipped_by: Option<Uuid>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_by: Option<Uuid>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub refund_reason: Option<String>,
    pub history: StatusHistoryEntry,
    pub timeline: TimelineEntry,
}

impl StatusChange {
    /// A bare transition with no side fields.
    pub fn new(
        expected: OrderStatus,
        status: OrderStatus,
        history: StatusHistoryEntry,
        timeline: TimelineEntry,
    ) -> Self {
        Self {
            expected,
            status,
            payment_status: None,
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
            history,
            timeline,
        }
    }
}

/// Outcome of a compare-and-set status change.
#[derive(Debug, Clone)]
pub enum StatusChangeResult {
    Applied(Box<Order>),
    NotFound,
    /// The order exists but is no longer in the expected status.
    Conflict(OrderStatus),
}

/// Optional data accepted alongside a status update.
///
/// # JSON Example
///
/// ```json
/// {
///   "status": "shipped",
///   "trackingNumber": "1Z999",
///   "carrier": "DHL",
///   "estimatedDelivery": "2025-01-20T00:00:00Z",
///   "notes": "Left warehouse"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateData {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    /// Cancellation or refund reason
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Body of `PATCH /api/admin/orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    /// Parsed by the reconciler so an unknown value yields a descriptive 400.
    pub status: String,
    #[serde(flatten)]
    pub data: StatusUpdateData,
}
