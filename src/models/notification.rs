//! Notifications emitted to buyers, vendors and admins.
//!
//! The notification feed itself is rendered elsewhere; this service only writes records.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderStatus,
    Payout,
    CommissionWithdrawal,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderStatus => "order_status",
            NotificationKind::Payout => "payout",
            NotificationKind::CommissionWithdrawal => "commission_withdrawal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}
