//! Commission calculation.
//!
//! Splits an amount between the platform and the vendor using the marketplace commission
//! rate. All arithmetic is on integer cents.

use std::sync::Arc;

use serde::Serialize;

use crate::db::traits::SettingsStore;
use crate::error::AppError;
use crate::models::settings::CommissionRate;

/// How an amount is divided between vendor and platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutSplit {
    pub vendor_amount_cents: i64,
    pub commission_amount_cents: i64,
    pub commission_rate: CommissionRate,
    pub currency: String,
}

/// Commission on `amount_cents`, rounded half-up to the cent.
///
/// Negative amounts are treated as zero.
pub fn commission_cents(amount_cents: i64, rate: CommissionRate) -> i64 {
    let amount = i128::from(amount_cents.max(0));
    let bps = i128::from(rate.bps());
    let max = i128::from(CommissionRate::MAX_BPS);
    ((amount * bps + max / 2) / max) as i64
}

/// Splits `amount_cents` so that `vendor + commission == amount` always holds.
///
/// Rounding happens once, on the commission; the vendor receives the exact remainder.
pub fn split_amount(amount_cents: i64, rate: CommissionRate) -> (i64, i64) {
    let amount_cents = amount_cents.max(0);
    let commission = commission_cents(amount_cents, rate);
    (amount_cents - commission, commission)
}

/// Render cents as a major-unit string, e.g. `12345` as `123.45`.
pub fn format_cents(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Reads the current rate on every calculation, so admin changes apply immediately.
#[derive(Clone)]
pub struct CommissionCalculator {
    settings: Arc<dyn SettingsStore>,
}

impl CommissionCalculator {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub async fn current_rate(&self) -> Result<CommissionRate, AppError> {
        Ok(self.settings.marketplace_settings().await?.commission_rate)
    }

    /// Split an order amount between vendor and platform at the current rate.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: the amount is negative
    /// - `Database`: the settings could not be read
    pub async fn calculate_payout(
        &self,
        amount_cents: i64,
        currency: &str,
    ) -> Result<PayoutSplit, AppError> {
        if amount_cents < 0 {
            return Err(AppError::InvalidRequest(
                "Amount must not be negative".to_string(),
            ));
        }
        let rate = self.current_rate().await?;
        Ok(Self::split_at(amount_cents, currency, rate))
    }

    /// Same as [`calculate_payout`](Self::calculate_payout) with a rate the caller already read,
    /// so a batch uses one consistent rate.
    pub fn split_at(amount_cents: i64, currency: &str, rate: CommissionRate) -> PayoutSplit {
        let (vendor_amount_cents, commission_amount_cents) = split_amount(amount_cents, rate);
        PayoutSplit {
            vendor_amount_cents,
            commission_amount_cents,
            commission_rate: rate,
            currency: currency.to_string(),
        }
    }
}
