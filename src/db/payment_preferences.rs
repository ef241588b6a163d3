//! PostgreSQL payout preferences and the insert-only payout ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::types::Json;
use uuid::Uuid;

use super::{PgStore, decode_error};
use crate::db::traits::PaymentPreferencesStore;
use crate::error::AppError;
use crate::models::payment_preferences::{
    BankAccountDetails, CappedAppend, CryptoWalletDetails, MobileMoneyDetails, NewPayoutRecord,
    Payee, PayeeKind, PaymentPreferences, PaypalDetails, PayoutRecord,
};

const INSERT_PAYOUT: &str = r#"
    INSERT INTO payout_history (
        payee_kind, payee_id, amount_cents, currency, method, status, transaction_id, details
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING *
"#;

fn insert_payout(record: &NewPayoutRecord) -> QueryAs<'_, Postgres, PayoutRow, PgArguments> {
    sqlx::query_as::<_, PayoutRow>(INSERT_PAYOUT)
        .bind(record.payee.kind.as_str())
        .bind(record.payee.id)
        .bind(record.amount_cents)
        .bind(&record.currency)
        .bind(record.method.map(|m| m.as_str()))
        .bind(record.status.as_str())
        .bind(&record.transaction_id)
        .bind(Json(&record.details))
}

#[derive(Debug, sqlx::FromRow)]
struct PreferencesRow {
    id: Uuid,
    payee_kind: String,
    payee_id: Uuid,
    mobile_money: Json<MobileMoneyDetails>,
    bank_account: Json<BankAccountDetails>,
    paypal: Json<PaypalDetails>,
    crypto_wallet: Json<CryptoWalletDetails>,
    default_payment_method: Option<String>,
    is_verified: bool,
    verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PreferencesRow> for PaymentPreferences {
    type Error = sqlx::Error;

    fn try_from(row: PreferencesRow) -> Result<Self, Self::Error> {
        Ok(PaymentPreferences {
            id: row.id,
            payee: Payee {
                kind: row.payee_kind.parse().map_err(decode_error)?,
                id: row.payee_id,
            },
            mobile_money: row.mobile_money.0,
            bank_account: row.bank_account.0,
            paypal: row.paypal.0,
            crypto_wallet: row.crypto_wallet.0,
            default_payment_method: row
                .default_payment_method
                .map(|m| m.parse())
                .transpose()
                .map_err(decode_error)?,
            is_verified: row.is_verified,
            verified_at: row.verified_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PayoutRow {
    id: i64,
    payee_kind: String,
    payee_id: Uuid,
    amount_cents: i64,
    currency: String,
    method: Option<String>,
    status: String,
    transaction_id: Option<String>,
    details: Json<serde_json::Value>,
    processed_at: DateTime<Utc>,
}

impl TryFrom<PayoutRow> for PayoutRecord {
    type Error = sqlx::Error;

    fn try_from(row: PayoutRow) -> Result<Self, Self::Error> {
        Ok(PayoutRecord {
            id: row.id,
            payee: Payee {
                kind: row.payee_kind.parse().map_err(decode_error)?,
                id: row.payee_id,
            },
            amount_cents: row.amount_cents,
            currency: row.currency,
            method: row.method.map(|m| m.parse()).transpose().map_err(decode_error)?,
            status: row.status.parse().map_err(decode_error)?,
            transaction_id: row.transaction_id,
            details: row.details.0,
            processed_at: row.processed_at,
        })
    }
}

fn into_payouts(rows: Vec<PayoutRow>) -> Result<Vec<PayoutRecord>, AppError> {
    rows.into_iter()
        .map(|row| PayoutRecord::try_from(row).map_err(AppError::from))
        .collect()
}

#[async_trait]
impl PaymentPreferencesStore for PgStore {
    async fn find_preferences(&self, payee: Payee) -> Result<Option<PaymentPreferences>, AppError> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            "SELECT * FROM payment_preferences WHERE payee_kind = $1 AND payee_id = $2",
        )
        .bind(payee.kind.as_str())
        .bind(payee.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PaymentPreferences::try_from).transpose()?)
    }

    async fn get_or_create_preferences(&self, payee: Payee) -> Result<PaymentPreferences, AppError> {
        sqlx::query(
            r#"
            INSERT INTO payment_preferences (payee_kind, payee_id)
            VALUES ($1, $2)
            ON CONFLICT (payee_kind, payee_id) DO NOTHING
            "#,
        )
        .bind(payee.kind.as_str())
        .bind(payee.id)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, PreferencesRow>(
            "SELECT * FROM payment_preferences WHERE payee_kind = $1 AND payee_id = $2",
        )
        .bind(payee.kind.as_str())
        .bind(payee.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(PaymentPreferences::try_from(row)?)
    }

    async fn save_preferences(
        &self,
        preferences: &PaymentPreferences,
    ) -> Result<PaymentPreferences, AppError> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            r#"
            INSERT INTO payment_preferences (
                payee_kind, payee_id, mobile_money, bank_account, paypal, crypto_wallet,
                default_payment_method, is_verified, verified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payee_kind, payee_id) DO UPDATE
            SET mobile_money = EXCLUDED.mobile_money,
                bank_account = EXCLUDED.bank_account,
                paypal = EXCLUDED.paypal,
                crypto_wallet = EXCLUDED.crypto_wallet,
                default_payment_method = EXCLUDED.default_payment_method,
                is_verified = EXCLUDED.is_verified,
                verified_at = EXCLUDED.verified_at,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(preferences.payee.kind.as_str())
        .bind(preferences.payee.id)
        .bind(Json(&preferences.mobile_money))
        .bind(Json(&preferences.bank_account))
        .bind(Json(&preferences.paypal))
        .bind(Json(&preferences.crypto_wallet))
        .bind(preferences.default_payment_method.map(|m| m.as_str()))
        .bind(preferences.is_verified)
        .bind(preferences.verified_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(PaymentPreferences::try_from(row)?)
    }

    async fn append_payout(&self, record: NewPayoutRecord) -> Result<PayoutRecord, AppError> {
        let row = insert_payout(&record).fetch_one(&self.pool).await?;
        Ok(PayoutRecord::try_from(row)?)
    }

    async fn append_payout_within(
        &self,
        record: NewPayoutRecord,
        ceiling_cents: i64,
    ) -> Result<CappedAppend, AppError> {
        let currency = record.currency.to_uppercase();
        let mut tx = self.pool.begin().await?;

        // Serialises capped writers per payee kind and currency until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("payout_cap:{}:{}", record.payee.kind.as_str(), currency))
            .execute(&mut *tx)
            .await?;

        let withdrawn_cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payout_history
            WHERE payee_kind = $1 AND upper(currency) = $2 AND status <> 'failed'
            "#,
        )
        .bind(record.payee.kind.as_str())
        .bind(&currency)
        .fetch_one(&mut *tx)
        .await?;

        if withdrawn_cents.saturating_add(record.amount_cents) > ceiling_cents {
            tx.rollback().await?;
            return Ok(CappedAppend::Exceeded { withdrawn_cents });
        }

        let row = insert_payout(&record).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(CappedAppend::Recorded(PayoutRecord::try_from(row)?))
    }

    async fn find_order_payout(
        &self,
        payee: Payee,
        order_id: Uuid,
    ) -> Result<Option<PayoutRecord>, AppError> {
        let row = sqlx::query_as::<_, PayoutRow>(
            r#"
            SELECT * FROM payout_history
            WHERE payee_kind = $1 AND payee_id = $2 AND status <> 'failed'
              AND details->'context'->>'orderId' = $3
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(payee.kind.as_str())
        .bind(payee.id)
        .bind(order_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PayoutRecord::try_from).transpose()?)
    }

    async fn payout_history(&self, payee: Payee) -> Result<Vec<PayoutRecord>, AppError> {
        let rows = sqlx::query_as::<_, PayoutRow>(
            "SELECT * FROM payout_history WHERE payee_kind = $1 AND payee_id = $2 ORDER BY id",
        )
        .bind(payee.kind.as_str())
        .bind(payee.id)
        .fetch_all(&self.pool)
        .await?;
        into_payouts(rows)
    }

    async fn list_payouts(
        &self,
        kind: Option<PayeeKind>,
        limit: i64,
    ) -> Result<Vec<PayoutRecord>, AppError> {
        let rows = sqlx::query_as::<_, PayoutRow>(
            r#"
            SELECT * FROM payout_history
            WHERE ($1::text IS NULL OR payee_kind = $1)
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        into_payouts(rows)
    }
}
