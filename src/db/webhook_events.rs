//! PostgreSQL webhook idempotency ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::{PgStore, decode_error};
use crate::db::traits::WebhookLedger;
use crate::error::AppError;
use crate::models::webhook::{
    LedgerOutcome, LedgerStatus, NewWebhookEvent, RetryPolicy, WebhookEvent, WebhookSource,
};

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    id: Uuid,
    source: String,
    event_id: String,
    tx_ref: Option<String>,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    metadata: Json<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WebhookEventRow> for WebhookEvent {
    type Error = sqlx::Error;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEvent {
            id: row.id,
            source: row.source.parse().map_err(decode_error)?,
            event_id: row.event_id,
            tx_ref: row.tx_ref,
            status: row.status.parse().map_err(decode_error)?,
            attempts: row.attempts,
            last_error: row.last_error,
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl WebhookLedger for PgStore {
    async fn record_if_new(
        &self,
        event: NewWebhookEvent,
        policy: RetryPolicy,
    ) -> Result<LedgerOutcome, AppError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (source, event_id, tx_ref, metadata)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.source.as_str())
        .bind(&event.event_id)
        .bind(&event.tx_ref)
        .bind(Json(&event.metadata))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(LedgerOutcome::Accepted { attempt: 1 }),
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                // Already seen. Only a failed or abandoned application may be claimed again;
                // the status check inside the UPDATE keeps concurrent retries exclusive.
                let attempt: Option<i32> = sqlx::query_scalar(
                    r#"
                    UPDATE webhook_events
                    SET status = 'recorded',
                        attempts = attempts + 1,
                        updated_at = NOW()
                    WHERE source = $1 AND event_id = $2
                      AND attempts < $3
                      AND (
                        status = 'failed'
                        OR (status = 'recorded'
                            AND updated_at < NOW() - make_interval(secs => $4))
                      )
                    RETURNING attempts
                    "#,
                )
                .bind(event.source.as_str())
                .bind(&event.event_id)
                .bind(policy.max_attempts)
                .bind(policy.recorded_lease.num_milliseconds() as f64 / 1000.0)
                .fetch_optional(&self.pool)
                .await?;

                Ok(attempt.map_or(LedgerOutcome::Duplicate, |attempt| {
                    LedgerOutcome::Accepted { attempt }
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mark(
        &self,
        source: WebhookSource,
        event_id: &str,
        status: LedgerStatus,
        error: Option<String>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = $3, last_error = $4, updated_at = NOW()
            WHERE source = $1 AND event_id = $2
            "#,
        )
        .bind(source.as_str())
        .bind(event_id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_event(
        &self,
        source: WebhookSource,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, AppError> {
        let row = sqlx::query_as::<_, WebhookEventRow>(
            "SELECT * FROM webhook_events WHERE source = $1 AND event_id = $2",
        )
        .bind(source.as_str())
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WebhookEvent::try_from).transpose()?)
    }
}
