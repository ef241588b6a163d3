//! Order status reconciliation.
//!
//! Drives orders through their status machine in response to admin actions and payment
//! confirmations. Every change appends exactly one status history entry and one timeline
//! entry, then notifies the buyer and each distinct vendor on the order.
//!
//! # Failure Semantics
//!
//! - Unknown order: `OrderNotFound`
//! - Status changed concurrently: `InvalidStatusTransition` against the current status
//! - Notification failures are logged and never roll back the status change

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::db::traits::{NotificationSink, OrderStore};
use crate::error::AppError;
use crate::models::notification::{NewNotification, NotificationKind};
use crate::models::order::{
    Order, OrderNotification, OrderStatus, PaymentStatus, StatusChange, StatusChangeResult,
    StatusHistoryEntry, StatusUpdateData, TimelineEntry,
};
use crate::models::webhook::WebhookSource;
use crate::services::notifications::notify_best_effort;

/// Result of applying a provider payment confirmation.
#[derive(Debug, Clone)]
pub enum PaymentConfirmation {
    Confirmed(Box<Order>),
    /// Order had already left `pending`; nothing was changed
    AlreadySettled(OrderStatus),
    NotFound,
}

#[derive(Clone)]
pub struct OrderStatusReconciler {
    orders: Arc<dyn OrderStore>,
    notifications: Arc<dyn NotificationSink>,
}

impl OrderStatusReconciler {
    pub fn new(orders: Arc<dyn OrderStore>, notifications: Arc<dyn NotificationSink>) -> Self {
        Self {
            orders,
            notifications,
        }
    }

    /// Set an order's status on behalf of `actor`.
    ///
    /// `new_status` must be one of the seven settable statuses (everything except `paid`).
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: &str,
        data: StatusUpdateData,
        actor: Uuid,
    ) -> Result<Order, AppError> {
        let status: OrderStatus = new_status
            .parse()
            .ok()
            .filter(OrderStatus::is_settable)
            .ok_or_else(|| {
                let allowed: Vec<&str> = OrderStatus::SETTABLE.iter().map(|s| s.as_str()).collect();
                AppError::InvalidRequest(format!(
                    "Invalid status '{new_status}'. Must be one of: {}",
                    allowed.join(", ")
                ))
            })?;

        let order = self
            .orders
            .find_order(order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;

        if !order.status.can_transition_to(status) {
            return Err(AppError::InvalidStatusTransition {
                from: order.status,
                to: status,
            });
        }

        let now = Utc::now();
        let history = StatusHistoryEntry {
            status,
            timestamp: now,
            notes: data.notes.clone(),
            actor: Some(actor),
        };
        let timeline = TimelineEntry {
            event: "status_updated".to_string(),
            timestamp: now,
            details: json!({
                "from": order.status,
                "to": status,
                "actor": actor,
                "notes": data.notes,
            }),
        };

        let mut change = StatusChange::new(order.status, status, history, timeline);
        match status {
            OrderStatus::Shipped => {
                change.tracking_number = data.tracking_number;
                change.carrier = data.carrier;
                change.estimated_delivery = data.estimated_delivery;
                change.shipped_by = Some(actor);
                change.shipped_at = Some(now);
            }
            OrderStatus::Delivered => {
                change.delivered_by = Some(actor);
                change.delivered_at = Some(now);
            }
            OrderStatus::Cancelled => change.cancellation_reason = data.reason,
            OrderStatus::Refunded => change.refund_reason = data.reason,
            _ => {}
        }

        let updated = match self.orders.apply_status_change(order_id, change).await? {
            StatusChangeResult::Applied(order) => *order,
            StatusChangeResult::NotFound => return Err(AppError::OrderNotFound),
            StatusChangeResult::Conflict(current) => {
                return Err(AppError::InvalidStatusTransition {
                    from: current,
                    to: status,
                });
            }
        };

        tracing::info!(
            order_number = %updated.order_number,
            from = %order.status,
            to = %status,
            %actor,
            "Order status updated"
        );

        self.notify_order_parties(&updated).await;
        Ok(updated)
    }

    /// Mark a pending order as paid after a verified provider confirmation.
    ///
    /// Flutterwave confirmations complete the order, Paystack confirmations mark it paid.
    pub async fn confirm_payment(
        &self,
        order: &Order,
        source: WebhookSource,
        transaction_id: &str,
        tx_ref: &str,
    ) -> Result<PaymentConfirmation, AppError> {
        let status = match source {
            WebhookSource::Flutterwave => OrderStatus::Completed,
            WebhookSource::Paystack => OrderStatus::Paid,
        };
        let now = Utc::now();
        let history = StatusHistoryEntry {
            status,
            timestamp: now,
            notes: Some(format!("Payment confirmed via {source}")),
            actor: None,
        };
        let timeline = TimelineEntry {
            event: "payment_confirmed".to_string(),
            timestamp: now,
            details: json!({
                "provider": source,
                "transactionId": transaction_id,
                "txRef": tx_ref,
            }),
        };

        let mut change = StatusChange::new(OrderStatus::Pending, status, history, timeline);
        change.payment_status = Some(PaymentStatus::Confirmed);
        change.payment_confirmed_at = Some(now);

        match self.orders.apply_status_change(order.id, change).await? {
            StatusChangeResult::Applied(updated) => {
                self.notify_order_parties(&updated).await;
                Ok(PaymentConfirmation::Confirmed(updated))
            }
            StatusChangeResult::Conflict(current) => Ok(PaymentConfirmation::AlreadySettled(current)),
            StatusChangeResult::NotFound => Ok(PaymentConfirmation::NotFound),
        }
    }

    /// Notify the buyer and every distinct vendor about the order's current status.
    async fn notify_order_parties(&self, order: &Order) {
        let data = json!({
            "orderId": order.id,
            "orderNumber": order.order_number,
            "status": order.status,
        });

        let mut recipients = vec![(order.buyer_id, buyer_message(order))];
        recipients.extend(
            order
                .vendor_ids()
                .into_iter()
                .map(|vendor_id| (vendor_id, vendor_message(order))),
        );

        for (recipient_id, message) in recipients {
            let notification = NewNotification {
                recipient_id,
                kind: NotificationKind::OrderStatus,
                title: format!("Order {} update", order.order_number),
                message: message.clone(),
                data: data.clone(),
            };
            if notify_best_effort(self.notifications.as_ref(), notification).await {
                let entry = OrderNotification {
                    recipient_id,
                    message,
                    sent_at: Utc::now(),
                };
                if let Err(e) = self.orders.append_notification(order.id, entry).await {
                    tracing::warn!(order_id = %order.id, "Failed to record order notification: {}", e);
                }
            }
        }
    }
}

fn buyer_message(order: &Order) -> String {
    let number = &order.order_number;
    match order.status {
        OrderStatus::Pending => format!("Your order {number} is pending."),
        OrderStatus::Paid => format!("Payment received for your order {number}."),
        OrderStatus::Processing => format!("Your order {number} is being processed."),
        OrderStatus::Shipped => match (&order.carrier, &order.tracking_number) {
            (Some(carrier), Some(tracking)) => {
                format!("Your order {number} has been shipped with {carrier} (tracking {tracking}).")
            }
            (_, Some(tracking)) => format!("Your order {number} has been shipped (tracking {tracking})."),
            _ => format!("Your order {number} has been shipped."),
        },
        OrderStatus::Delivered => format!("Your order {number} has been delivered."),
        OrderStatus::Completed => format!("Your order {number} is complete. Thank you!"),
        OrderStatus::Cancelled => match &order.cancellation_reason {
            Some(reason) => format!("Your order {number} has been cancelled: {reason}"),
            None => format!("Your order {number} has been cancelled."),
        },
        OrderStatus::Refunded => format!("Your order {number} has been refunded."),
    }
}

fn vendor_message(order: &Order) -> String {
    format!(
        "Order {} containing your products is now {}.",
        order.order_number, order.status
    )
}
