//! PostgreSQL settings storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PgStore, decode_error};
use crate::db::traits::SettingsStore;
use crate::error::AppError;
use crate::models::settings::{CommissionRate, MARKETPLACE_SETTINGS, MarketplaceSettings};

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    commission_rate_bps: i32,
    updated_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SettingsRow> for MarketplaceSettings {
    type Error = sqlx::Error;

    fn try_from(row: SettingsRow) -> Result<Self, Self::Error> {
        let commission_rate = u32::try_from(row.commission_rate_bps)
            .ok()
            .and_then(CommissionRate::from_bps)
            .ok_or_else(|| {
                decode_error(format!("invalid commission rate: {} bps", row.commission_rate_bps))
            })?;
        Ok(MarketplaceSettings {
            commission_rate,
            updated_by: row.updated_by,
            updated_at: Some(row.updated_at),
        })
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn marketplace_settings(&self) -> Result<MarketplaceSettings, AppError> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT commission_rate_bps, updated_by, updated_at FROM settings WHERE type = $1",
        )
        .bind(MARKETPLACE_SETTINGS)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(MarketplaceSettings::try_from(row)?),
            None => Ok(MarketplaceSettings::default()),
        }
    }

    async fn set_commission_rate(
        &self,
        rate: CommissionRate,
        updated_by: Uuid,
    ) -> Result<MarketplaceSettings, AppError> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            INSERT INTO settings (type, commission_rate_bps, updated_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (type) DO UPDATE
            SET commission_rate_bps = EXCLUDED.commission_rate_bps,
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            RETURNING commission_rate_bps, updated_by, updated_at
            "#,
        )
        .bind(MARKETPLACE_SETTINGS)
        .bind(rate.bps() as i32)
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(MarketplaceSettings::try_from(row)?)
    }
}
