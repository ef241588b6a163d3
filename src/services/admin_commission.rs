//! Platform commission accounting and withdrawal.
//!
//! Commission only becomes withdrawable once the vendors of the underlying order have
//! been paid: orders count toward the total only after `vendorPayoutProcessed` is set.
//!
//! Withdrawals are capped in storage: the payout record is only written while every
//! non-failed admin payout in the currency stays within the commission earned, so
//! concurrent withdrawals from any number of instances cannot overdraw.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::traits::{OrderStore, PaymentPreferencesStore};
use crate::error::AppError;
use crate::models::payment_preferences::{Payee, PayeeKind, PayoutRecord, PayoutStatus};
use crate::models::settings::CommissionRate;
use crate::services::commission::{CommissionCalculator, commission_cents};
use crate::services::payout::{PayoutResult, PayoutRouter};

/// Commission position in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionTotal {
    pub currency: String,
    pub order_count: usize,
    pub total_commission_cents: i64,
    /// Admin payouts that have not failed
    pub withdrawn_cents: i64,
    pub available_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCommission {
    pub order_id: Uuid,
    pub order_number: String,
    pub currency: String,
    pub gross_cents: i64,
    pub commission_cents: i64,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionReport {
    pub commission_rate: CommissionRate,
    pub totals: Vec<CommissionTotal>,
    pub orders: Vec<OrderCommission>,
}

pub struct AdminCommissionService {
    orders: Arc<dyn OrderStore>,
    preferences: Arc<dyn PaymentPreferencesStore>,
    commission: CommissionCalculator,
    router: PayoutRouter,
}

impl AdminCommissionService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        preferences: Arc<dyn PaymentPreferencesStore>,
        commission: CommissionCalculator,
        router: PayoutRouter,
    ) -> Self {
        Self {
            orders,
            preferences,
            commission,
            router,
        }
    }

    /// Per-currency totals, sorted by currency code.
    ///
    /// Commission is recomputed for every settled order at the rate in force now, not read
    /// from the `commissionCents` recorded on its vendor payouts. A rate change therefore
    /// moves the total for orders that were already settled.
    pub async fn calculate_total_commission(&self) -> Result<Vec<CommissionTotal>, AppError> {
        let rate = self.commission.current_rate().await?;
        let orders = self.order_commissions(rate).await?;
        self.totals(&orders).await
    }

    pub async fn report(&self) -> Result<CommissionReport, AppError> {
        let rate = self.commission.current_rate().await?;
        let orders = self.order_commissions(rate).await?;
        let totals = self.totals(&orders).await?;
        Ok(CommissionReport {
            commission_rate: rate,
            totals,
            orders,
        })
    }

    /// Withdraw commission to `admin_id`'s default payout method.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: non-positive amount
    /// - `InsufficientCommission`: more than the available balance in `currency`
    /// - Any [`PayoutRouter::process_payout`] error
    pub async fn withdraw(
        &self,
        admin_id: Uuid,
        amount_cents: i64,
        currency: &str,
        notes: Option<String>,
    ) -> Result<PayoutResult, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidRequest(
                "Withdrawal amount must be positive".to_string(),
            ));
        }
        let currency = currency.trim().to_uppercase();

        let (earned_cents, available_cents) = self
            .calculate_total_commission()
            .await?
            .into_iter()
            .find(|t| t.currency == currency)
            .map(|t| (t.total_commission_cents, t.available_cents))
            .unwrap_or((0, 0));

        if amount_cents > available_cents {
            return Err(AppError::InsufficientCommission {
                requested_cents: amount_cents,
                available_cents,
                currency,
            });
        }

        // Re-checked against the earned total when the record is written
        let result = self
            .router
            .process_capped_payout(
                Payee::admin(admin_id),
                amount_cents,
                &currency,
                json!({ "type": "commission_withdrawal", "notes": notes }),
                earned_cents,
            )
            .await?;
        tracing::info!(%admin_id, amount_cents, %currency, "Commission withdrawal recorded");
        Ok(result)
    }

    /// Every commission withdrawal by any admin, newest first.
    pub async fn history(&self, limit: i64) -> Result<Vec<PayoutRecord>, AppError> {
        self.preferences
            .list_payouts(Some(PayeeKind::Admin), limit)
            .await
    }

    /// One entry per settled order at `rate`. Commission is rounded per vendor share and
    /// summed, the same basis the payout sweep splits on.
    async fn order_commissions(
        &self,
        rate: CommissionRate,
    ) -> Result<Vec<OrderCommission>, AppError> {
        let orders = self.orders.list_vendor_settled_orders().await?;
        Ok(orders
            .into_iter()
            .map(|order| {
                let gross_cents = order.items_total_cents();
                OrderCommission {
                    order_id: order.id,
                    commission_cents: order
                        .gross_by_vendor()
                        .into_iter()
                        .map(|(_, gross)| commission_cents(gross, rate))
                        .sum(),
                    gross_cents,
                    order_number: order.order_number,
                    currency: order.currency.to_uppercase(),
                    settled_at: order.updated_at,
                }
            })
            .collect())
    }

    async fn totals(&self, orders: &[OrderCommission]) -> Result<Vec<CommissionTotal>, AppError> {
        let mut totals: BTreeMap<String, CommissionTotal> = BTreeMap::new();
        for order in orders {
            let entry = totals
                .entry(order.currency.clone())
                .or_insert_with(|| empty_total(&order.currency));
            entry.order_count += 1;
            entry.total_commission_cents += order.commission_cents;
        }

        let withdrawals = self
            .preferences
            .list_payouts(Some(PayeeKind::Admin), i64::MAX)
            .await?;
        for record in withdrawals
            .iter()
            .filter(|r| r.status != PayoutStatus::Failed)
        {
            let currency = record.currency.to_uppercase();
            totals
                .entry(currency.clone())
                .or_insert_with(|| empty_total(&currency))
                .withdrawn_cents += record.amount_cents;
        }

        Ok(totals
            .into_values()
            .map(|mut t| {
                t.available_cents = (t.total_commission_cents - t.withdrawn_cents).max(0);
                t
            })
            .collect())
    }
}

fn empty_total(currency: &str) -> CommissionTotal {
    CommissionTotal {
        currency: currency.to_string(),
        order_count: 0,
        total_commission_cents: 0,
        withdrawn_cents: 0,
        available_cents: 0,
    }
}
