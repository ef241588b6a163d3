//! PostgreSQL order storage.
//!
//! Appends to `status_history`, `timeline`, `notifications` and the payout metadata arrays
//! use `jsonb ||` inside a single UPDATE, never a read-modify-write of the whole row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::{PgStore, decode_error};
use crate::db::traits::OrderStore;
use crate::error::AppError;
use crate::models::order::{
    Order, OrderItem, OrderMetadata, OrderNotification, OrderStatus, PayoutErrorEntry,
    StatusChange, StatusChangeResult, StatusHistoryEntry, TimelineEntry, VendorPayoutEntry,
};

/// Raw `orders` row. Enum columns are stored as text and parsed on conversion.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    buyer_id: Uuid,
    items: Json<Vec<OrderItem>>,
    total_amount_cents: i64,
    currency: String,
    payment_method: String,
    tx_ref: Option<String>,
    status: String,
    payment_status: String,
    payment_confirmed_at: Option<DateTime<Utc>>,
    tracking_number: Option<String>,
    carrier: Option<String>,
    estimated_delivery: Option<DateTime<Utc>>,
    shipped_by: Option<Uuid>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_by: Option<Uuid>,
    delivered_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    refund_reason: Option<String>,
    status_history: Json<Vec<StatusHistoryEntry>>,
    timeline: Json<Vec<TimelineEntry>>,
    notifications: Json<Vec<OrderNotification>>,
    metadata: Json<OrderMetadata>,
    payout_claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = sqlx::Error;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            buyer_id: row.buyer_id,
            items: row.items.0,
            total_amount_cents: row.total_amount_cents,
            currency: row.currency,
            payment_method: row.payment_method.parse().map_err(decode_error)?,
            tx_ref: row.tx_ref,
            status: row.status.parse().map_err(decode_error)?,
            payment_status: row.payment_status.parse().map_err(decode_error)?,
            payment_confirmed_at: row.payment_confirmed_at,
            tracking_number: row.tracking_number,
            carrier: row.carrier,
            estimated_delivery: row.estimated_delivery,
            shipped_by: row.shipped_by,
            shipped_at: row.shipped_at,
            delivered_by: row.delivered_by,
            delivered_at: row.delivered_at,
            cancellation_reason: row.cancellation_reason,
            refund_reason: row.refund_reason,
            status_history: row.status_history.0,
            timeline: row.timeline.0,
            notifications: row.notifications.0,
            metadata: row.metadata.0,
            payout_claimed_at: row.payout_claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, AppError> {
    rows.into_iter()
        .map(|row| Order::try_from(row).map_err(AppError::from))
        .collect()
}

const VENDOR_UNPAID: &str = "COALESCE((metadata->>'vendorPayoutProcessed')::boolean, false) = false";

#[async_trait]
impl OrderStore for PgStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Order::try_from).transpose()?)
    }

    async fn find_order_by_tx_ref(&self, tx_ref: &str) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE tx_ref = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(tx_ref)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => Some(row),
            // Orders created before tx_ref became a column
            None => {
                sqlx::query_as::<_, OrderRow>(
                    r#"
                    SELECT * FROM orders
                    WHERE metadata -> 'paymentDetails' ->> 'tx_ref' = $1
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(tx_ref)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row.map(Order::try_from).transpose()?)
    }

    async fn apply_status_change(
        &self,
        id: Uuid,
        change: StatusChange,
    ) -> Result<StatusChangeResult, AppError> {
        let updated = sqlx::query_as::<_, OrderRow>(
            r#"
            UPDATE orders
            SET status = $2,
                payment_status = COALESCE($3, payment_status),
                payment_confirmed_at = COALESCE($4, payment_confirmed_at),
                tracking_number = COALESCE($5, tracking_number),
                carrier = COALESCE($6, carrier),
                estimated_delivery = COALESCE($7, estimated_delivery),
                shipped_by = COALESCE($8, shipped_by),
                shipped_at = COALESCE($9, shipped_at),
                delivered_by = COALESCE($10, delivered_by),
                delivered_at = COALESCE($11, delivered_at),
                cancellation_reason = COALESCE($12, cancellation_reason),
                refund_reason = COALESCE($13, refund_reason),
                status_history = status_history || jsonb_build_array($14::jsonb),
                timeline = timeline || jsonb_build_array($15::jsonb),
                updated_at = NOW()
            WHERE id = $1 AND status = $16
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(change.status.as_str())
        .bind(change.payment_status.map(|s| s.as_str()))
        .bind(change.payment_confirmed_at)
        .bind(change.tracking_number)
        .bind(change.carrier)
        .bind(change.estimated_delivery)
        .bind(change.shipped_by)
        .bind(change.shipped_at)
        .bind(change.delivered_by)
        .bind(change.delivered_at)
        .bind(change.cancellation_reason)
        .bind(change.refund_reason)
        .bind(Json(&change.history))
        .bind(Json(&change.timeline))
        .bind(change.expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(StatusChangeResult::Applied(Box::new(Order::try_from(row)?)));
        }

        // Nothing matched: either the order is gone or someone changed its status first
        let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match current {
            None => Ok(StatusChangeResult::NotFound),
            Some(status) => {
                let status: OrderStatus = status.parse().map_err(decode_error)?;
                Ok(StatusChangeResult::Conflict(status))
            }
        }
    }

    async fn append_notification(
        &self,
        id: Uuid,
        entry: OrderNotification,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE orders SET notifications = notifications || jsonb_build_array($2::jsonb) WHERE id = $1",
        )
        .bind(id)
        .bind(Json(&entry))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_for_vendor_payout(
        &self,
        limit: i64,
        claim_ttl: chrono::Duration,
    ) -> Result<Vec<Order>, AppError> {
        // SKIP LOCKED lets concurrent sweeps (other instances) claim disjoint batches
        let query = format!(
            r#"
            UPDATE orders
            SET payout_claimed_at = NOW()
            WHERE id IN (
                SELECT id FROM orders
                WHERE status = 'completed'
                  AND {VENDOR_UNPAID}
                  AND (payout_claimed_at IS NULL
                       OR payout_claimed_at < NOW() - make_interval(secs => $2))
                ORDER BY updated_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#
        );
        let rows = sqlx::query_as::<_, OrderRow>(&query)
            .bind(limit)
            .bind(claim_ttl.num_seconds() as f64)
            .fetch_all(&self.pool)
            .await?;
        into_orders(rows)
    }

    async fn complete_vendor_payout(
        &self,
        id: Uuid,
        payouts: Vec<VendorPayoutEntry>,
        errors: Vec<PayoutErrorEntry>,
        timeline: Vec<TimelineEntry>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET metadata = metadata || jsonb_build_object(
                    'vendorPayoutProcessed', true,
                    'vendorPayouts', COALESCE(metadata -> 'vendorPayouts', '[]'::jsonb) || $2::jsonb,
                    'payoutErrors', COALESCE(metadata -> 'payoutErrors', '[]'::jsonb) || $3::jsonb
                ),
                timeline = timeline || $4::jsonb,
                payout_claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(&payouts))
        .bind(Json(&errors))
        .bind(Json(&timeline))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_payout_claim(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE orders SET payout_claimed_at = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_vendor_settled_orders(&self) -> Result<Vec<Order>, AppError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT * FROM orders
            WHERE status = 'completed'
              AND COALESCE((metadata->>'vendorPayoutProcessed')::boolean, false) = true
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        into_orders(rows)
    }
}
