//! Best-effort notification delivery.

use crate::db::traits::NotificationSink;
use crate::models::notification::NewNotification;

/// Sends a notification, logging instead of failing. Returns whether it was delivered.
///
/// Notification delivery must never undo or fail the operation that triggered it.
pub async fn notify_best_effort(sink: &dyn NotificationSink, notification: NewNotification) -> bool {
    let recipient = notification.recipient_id;
    let kind = notification.kind.as_str();
    match sink.notify(notification).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(%recipient, kind, "Failed to send notification: {}", e);
            false
        }
    }
}
