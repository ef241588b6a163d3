//! Business logic services.
//!
//! Services contain the payment, payout and order logic separated from HTTP handlers.
//! They depend on the storage traits in [`crate::db::traits`], never on the pool directly.

pub mod admin_commission;
pub mod commission;
pub mod notifications;
pub mod order_status;
pub mod payout;
pub mod preferences;
pub mod providers;
pub mod signature;
pub mod vendor_payouts;
pub mod webhook_processor;
