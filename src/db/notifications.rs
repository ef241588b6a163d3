//! PostgreSQL notification sink.

use async_trait::async_trait;
use sqlx::types::Json;

use super::PgStore;
use crate::db::traits::NotificationSink;
use crate::error::AppError;
use crate::models::notification::NewNotification;

#[async_trait]
impl NotificationSink for PgStore {
    async fn notify(&self, notification: NewNotification) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (recipient_id, kind, title, message, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(notification.recipient_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(Json(&notification.data))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
