//! Vendor payout sweep.
//!
//! Completed orders are claimed in batches, each vendor's share is paid through the
//! [`PayoutRouter`], and the order is marked `vendorPayoutProcessed`. Claims go through the
//! store (`payout_claimed_at` + `SKIP LOCKED`), so several instances can sweep at once
//! without paying an order twice. Within one process an in-memory flag stops overlapping runs.
//!
//! Every payout carries the order id in its history context. A vendor who already has a
//! non-failed payout for the order is not paid again when the order is retried, so an order
//! whose final write failed can be released and swept again safely.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::traits::OrderStore;
use crate::error::AppError;
use crate::models::order::{Order, PayoutErrorEntry, TimelineEntry, VendorPayoutEntry};
use crate::models::payment_preferences::{Payee, PayoutRecord};
use crate::models::settings::CommissionRate;
use crate::services::commission::{CommissionCalculator, PayoutSplit};
use crate::services::payout::PayoutRouter;

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Another sweep was already running in this process
    pub skipped: bool,
    pub orders_processed: usize,
    pub payouts_succeeded: usize,
    pub payouts_failed: usize,
    /// Orders handed back for the next run after an infrastructure fault
    pub orders_released: usize,
}

/// Resets the running flag when the sweep ends, including on early return.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct VendorPayoutService {
    orders: Arc<dyn OrderStore>,
    router: PayoutRouter,
    commission: CommissionCalculator,
    batch_size: i64,
    claim_ttl: chrono::Duration,
    running: AtomicBool,
}

impl VendorPayoutService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        router: PayoutRouter,
        commission: CommissionCalculator,
        batch_size: i64,
        claim_ttl: chrono::Duration,
    ) -> Self {
        Self {
            orders,
            router,
            commission,
            batch_size: batch_size.max(1),
            claim_ttl,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run_sweep(&self) -> Result<SweepReport, AppError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Vendor payout sweep already running, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..Default::default()
            });
        }
        let _guard = RunningGuard(&self.running);

        // One rate for the whole batch
        let rate = self.commission.current_rate().await?;
        let claimed = self
            .orders
            .claim_for_vendor_payout(self.batch_size, self.claim_ttl)
            .await?;

        let mut report = SweepReport::default();
        for order in &claimed {
            match self.settle_order(order, rate).await {
                Ok((succeeded, failed)) => {
                    report.orders_processed += 1;
                    report.payouts_succeeded += succeeded;
                    report.payouts_failed += failed;
                }
                Err(e) => {
                    tracing::error!(
                        order_number = %order.order_number,
                        "Vendor payout aborted, releasing order: {}",
                        e
                    );
                    if let Err(e) = self.orders.release_payout_claim(order.id).await {
                        tracing::error!(order_number = %order.order_number, "Failed to release payout claim: {}", e);
                    }
                    report.orders_released += 1;
                }
            }
        }

        tracing::info!(
            claimed = claimed.len(),
            processed = report.orders_processed,
            succeeded = report.payouts_succeeded,
            failed = report.payouts_failed,
            released = report.orders_released,
            "Vendor payout sweep finished"
        );
        Ok(report)
    }

    /// Pay every vendor on one claimed order. Returns `(succeeded, failed)` payout counts.
    ///
    /// Per-vendor failures are recorded on the order and do not stop the others. An
    /// infrastructure fault before any vendor was paid aborts the order so it can be
    /// retried whole; after that it is recorded like any other per-vendor failure.
    /// Vendors paid by an earlier, unfinished attempt are carried over from payout history.
    async fn settle_order(
        &self,
        order: &Order,
        rate: CommissionRate,
    ) -> Result<(usize, usize), AppError> {
        let mut payouts = Vec::new();
        let mut errors = Vec::new();
        let mut timeline = Vec::new();

        for (vendor_id, gross_cents) in order.gross_by_vendor() {
            let split = CommissionCalculator::split_at(gross_cents, &order.currency, rate);
            if split.vendor_amount_cents <= 0 {
                continue;
            }

            let payee = Payee::vendor(vendor_id);
            let earlier = match self.router.find_order_payout(payee, order.id).await {
                Ok(earlier) => earlier,
                Err(e) if payouts.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        order_number = %order.order_number,
                        %vendor_id,
                        "Could not check earlier payouts, skipping vendor: {}",
                        e
                    );
                    errors.push(PayoutErrorEntry {
                        vendor_id,
                        amount_cents: split.vendor_amount_cents,
                        error: e.to_string(),
                        occurred_at: Utc::now(),
                    });
                    continue;
                }
            };
            if let Some(record) = earlier {
                tracing::info!(
                    order_number = %order.order_number,
                    %vendor_id,
                    payout_id = record.id,
                    "Vendor already paid for this order, not paying again"
                );
                let entry = carried_over(vendor_id, gross_cents, &split, record);
                timeline.push(payout_timeline(&entry));
                payouts.push(entry);
                continue;
            }

            let context = json!({
                "orderId": order.id,
                "orderNumber": order.order_number,
                "grossCents": gross_cents,
                "commissionCents": split.commission_amount_cents,
                "commissionRate": rate,
            });
            match self
                .router
                .process_payout(
                    payee,
                    split.vendor_amount_cents,
                    &order.currency,
                    context,
                )
                .await
            {
                Ok(result) => {
                    let entry = VendorPayoutEntry {
                        vendor_id,
                        gross_cents,
                        vendor_amount_cents: split.vendor_amount_cents,
                        commission_cents: split.commission_amount_cents,
                        currency: order.currency.clone(),
                        method: result.method.to_string(),
                        status: result.status.as_str().to_string(),
                        transaction_id: result.transaction_id,
                        processed_at: Utc::now(),
                    };
                    timeline.push(payout_timeline(&entry));
                    payouts.push(entry);
                }
                Err(e) if e.is_infrastructure() && payouts.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        order_number = %order.order_number,
                        %vendor_id,
                        "Vendor payout failed: {}",
                        e
                    );
                    timeline.push(TimelineEntry::now(
                        "vendor_payout_failed",
                        json!({ "vendorId": vendor_id, "error": e.to_string() }),
                    ));
                    errors.push(PayoutErrorEntry {
                        vendor_id,
                        amount_cents: split.vendor_amount_cents,
                        error: e.to_string(),
                        occurred_at: Utc::now(),
                    });
                }
            }
        }

        let counts = (payouts.len(), errors.len());
        self.orders
            .complete_vendor_payout(order.id, payouts, errors, timeline)
            .await?;
        Ok(counts)
    }
}

fn payout_timeline(entry: &VendorPayoutEntry) -> TimelineEntry {
    TimelineEntry::now(
        "vendor_payout",
        json!({
            "vendorId": entry.vendor_id,
            "amountCents": entry.vendor_amount_cents,
            "method": entry.method,
            "transactionId": entry.transaction_id,
            "status": entry.status,
        }),
    )
}

/// Rebuilds the order entry for a payout recorded by an earlier attempt. The split stored
/// with that payout wins over one recomputed at today's rate.
fn carried_over(
    vendor_id: Uuid,
    gross_cents: i64,
    split: &PayoutSplit,
    record: PayoutRecord,
) -> VendorPayoutEntry {
    let context = &record.details["context"];
    VendorPayoutEntry {
        vendor_id,
        gross_cents: context["grossCents"].as_i64().unwrap_or(gross_cents),
        vendor_amount_cents: record.amount_cents,
        commission_cents: context["commissionCents"]
            .as_i64()
            .unwrap_or(split.commission_amount_cents),
        currency: record.currency,
        method: record.method.map(|m| m.to_string()).unwrap_or_default(),
        status: record.status.as_str().to_string(),
        transaction_id: record.transaction_id.unwrap_or_default(),
        processed_at: record.processed_at,
    }
}

/// Starts the periodic sweep. Do not await the returned JoinHandle, as it runs indefinitely.
pub fn start_payout_worker(service: Arc<VendorPayoutService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(period_secs = period.as_secs(), "Vendor payout worker started");
        loop {
            timer.tick().await;
            if let Err(e) = service.run_sweep().await {
                tracing::error!("Vendor payout sweep failed: {}", e);
            }
        }
    })
}
