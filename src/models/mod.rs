//! Data models representing database entities and API payloads.

/// Admin API key authentication model
pub mod admin_key;
/// Notification records
pub mod notification;
/// Orders, line items and their append-only logs
pub mod order;
/// Payee payout preferences and payout ledger
pub mod payment_preferences;
/// Marketplace settings (commission rate)
pub mod settings;
/// Inbound provider webhooks and the idempotency ledger
pub mod webhook;
