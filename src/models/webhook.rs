//! Webhook models for inbound payment provider events.
//!
//! This module defines the idempotency ledger record and the provider payloads
//! consumed by the webhook endpoints.
//!
//! # Webhook Flow
//!
//! 1. Provider POSTs a signed event to `/api/webhooks/{provider}`
//! 2. Signature is verified over the raw body
//! 3. `(source, event_id)` is recorded in the ledger; duplicates stop here
//! 4. The transaction is re-verified against the provider API
//! 5. The matching order is confirmed

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSource {
    Flutterwave,
    Paystack,
}

impl WebhookSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookSource::Flutterwave => "flutterwave",
            WebhookSource::Paystack => "paystack",
        }
    }
}

impl fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flutterwave" => Ok(WebhookSource::Flutterwave),
            "paystack" => Ok(WebhookSource::Paystack),
            other => Err(format!("Unknown webhook source: {other}")),
        }
    }
}

/// Processing state of a ledgered event.
///
/// - `recorded`: accepted and in flight
/// - `applied`: the order update went through (terminal)
/// - `failed`: verification or the order update hit a retryable fault; may be re-applied
/// - `discarded`: acknowledged without applying, e.g. provider disagreed (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Recorded,
    Applied,
    Failed,
    Discarded,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Recorded => "recorded",
            LedgerStatus::Applied => "applied",
            LedgerStatus::Failed => "failed",
            LedgerStatus::Discarded => "discarded",
        }
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recorded" => Ok(LedgerStatus::Recorded),
            "applied" => Ok(LedgerStatus::Applied),
            "failed" => Ok(LedgerStatus::Failed),
            "discarded" => Ok(LedgerStatus::Discarded),
            other => Err(format!("Unknown ledger status: {other}")),
        }
    }
}

/// Webhook ledger record.
///
/// # Database Table
///
/// Maps to the `webhook_events` table, unique on `(source, event_id)`.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub source: WebhookSource,
    pub event_id: String,
    pub tx_ref: Option<String>,
    pub status: LedgerStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to insert a ledger record.
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub source: WebhookSource,
    pub event_id: String,
    pub tx_ref: Option<String>,
    pub metadata: serde_json::Value,
}

/// When an already-recorded event may be applied again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Applications allowed per event, including the first
    pub max_attempts: i32,
    /// A `recorded` entry untouched for this long is treated as abandoned
    pub recorded_lease: chrono::Duration,
}

/// Result of trying to record an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// First delivery, or a retry of a failed or abandoned application.
    Accepted { attempt: i32 },
    Duplicate,
}

/// Flutterwave webhook body.
///
/// Older integrations post `id`/`tx_ref` at the top level, current ones nest them
/// under `data`; both are accepted.
///
/// ```json
/// {
///   "event": "charge.completed",
///   "data": { "id": 285959875, "tx_ref": "ORD-1", "status": "successful" }
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct FlutterwaveWebhook {
    pub event: Option<String>,
    pub id: Option<serde_json::Value>,
    pub tx_ref: Option<String>,
    pub data: Option<FlutterwaveWebhookData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlutterwaveWebhookData {
    pub id: Option<serde_json::Value>,
    pub tx_ref: Option<String>,
    pub status: Option<String>,
}

impl FlutterwaveWebhook {
    pub fn transaction_id(&self) -> Option<String> {
        self.id
            .as_ref()
            .or_else(|| self.data.as_ref().and_then(|d| d.id.as_ref()))
            .and_then(id_to_string)
    }

    pub fn tx_ref(&self) -> Option<String> {
        self.tx_ref
            .clone()
            .or_else(|| self.data.as_ref().and_then(|d| d.tx_ref.clone()))
            .filter(|r| !r.is_empty())
    }
}

/// Paystack webhook body. Only `charge.success` events are processed.
///
/// ```json
/// {
///   "event": "charge.success",
///   "data": { "id": 302961, "reference": "ORD-1", "status": "success" }
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct PaystackWebhook {
    pub event: String,
    #[serde(default)]
    pub data: PaystackWebhookData,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaystackWebhookData {
    pub id: Option<serde_json::Value>,
    pub reference: Option<String>,
    pub status: Option<String>,
}

impl PaystackWebhook {
    pub const CHARGE_SUCCESS: &'static str = "charge.success";

    pub fn transaction_id(&self) -> Option<String> {
        self.data.id.as_ref().and_then(id_to_string)
    }

    pub fn reference(&self) -> Option<String> {
        self.data.reference.clone().filter(|r| !r.is_empty())
    }
}

/// Providers send ids as JSON numbers; some proxies turn them into strings.
fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Provider-facing acknowledgment.
///
/// ```json
/// { "success": true, "received": true, "duplicate": true }
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WebhookAck {
    pub success: bool,
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
}

impl WebhookAck {
    pub fn received() -> Self {
        Self {
            success: true,
            received: true,
            duplicate: None,
        }
    }

    pub fn duplicate() -> Self {
        Self {
            duplicate: Some(true),
            ..Self::received()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flutterwave_reads_top_level_then_nested_fields() {
        let top: FlutterwaveWebhook =
            serde_json::from_str(r#"{"id": 12345, "tx_ref": "ORD-1"}"#).unwrap();
        assert_eq!(top.transaction_id().as_deref(), Some("12345"));
        assert_eq!(top.tx_ref().as_deref(), Some("ORD-1"));

        let nested: FlutterwaveWebhook = serde_json::from_str(
            r#"{"event": "charge.completed", "data": {"id": "987", "tx_ref": "ORD-2"}}"#,
        )
        .unwrap();
        assert_eq!(nested.transaction_id().as_deref(), Some("987"));
        assert_eq!(nested.tx_ref().as_deref(), Some("ORD-2"));
    }

    #[test]
    fn empty_identifiers_count_as_missing() {
        let body: FlutterwaveWebhook = serde_json::from_str(r#"{"id": "", "tx_ref": ""}"#).unwrap();
        assert!(body.transaction_id().is_none());
        assert!(body.tx_ref().is_none());
    }

    #[test]
    fn paystack_identifiers() {
        let body: PaystackWebhook = serde_json::from_str(
            r#"{"event": "charge.success", "data": {"id": 302961, "reference": "ref-1"}}"#,
        )
        .unwrap();
        assert_eq!(body.transaction_id().as_deref(), Some("302961"));
        assert_eq!(body.reference().as_deref(), Some("ref-1"));
    }

    #[test]
    fn duplicate_ack_shape() {
        let json = serde_json::to_value(WebhookAck::duplicate()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "received": true, "duplicate": true}));
        let json = serde_json::to_value(WebhookAck::received()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "received": true}));
    }
}
