//! Payment preference management for vendors and admins.

use std::sync::Arc;

use crate::db::traits::PaymentPreferencesStore;
use crate::error::AppError;
use crate::models::payment_preferences::{
    Payee, PayeeKind, PaymentPreferences, PayoutMethodKind, PayoutRecord, UpdatePaymentPreferencesRequest,
};

#[derive(Clone)]
pub struct PaymentPreferencesService {
    store: Arc<dyn PaymentPreferencesStore>,
}

impl PaymentPreferencesService {
    pub fn new(store: Arc<dyn PaymentPreferencesStore>) -> Self {
        Self { store }
    }

    /// The payee's document, created empty on first access.
    pub async fn get(&self, payee: Payee) -> Result<PaymentPreferences, AppError> {
        self.store.get_or_create_preferences(payee).await
    }

    /// Apply a partial update.
    ///
    /// Every block enabled by the update must be complete, and the resulting default method
    /// must be enabled and complete.
    pub async fn update(
        &self,
        payee: Payee,
        update: UpdatePaymentPreferencesRequest,
    ) -> Result<PaymentPreferences, AppError> {
        let enabled_in_update: Vec<PayoutMethodKind> = [
            update.mobile_money.as_ref().map(|b| (PayoutMethodKind::MobileMoney, b.enabled)),
            update.bank_account.as_ref().map(|b| (PayoutMethodKind::BankAccount, b.enabled)),
            update.paypal.as_ref().map(|b| (PayoutMethodKind::Paypal, b.enabled)),
            update.crypto_wallet.as_ref().map(|b| (PayoutMethodKind::CryptoWallet, b.enabled)),
        ]
        .into_iter()
        .flatten()
        .filter_map(|(kind, enabled)| enabled.then_some(kind))
        .collect();

        let mut preferences = self.store.get_or_create_preferences(payee).await?;
        preferences.apply_update(update);

        for kind in enabled_in_update {
            ensure_complete(&preferences, kind)?;
        }
        if let Some(kind) = preferences.default_payment_method {
            if !preferences.is_enabled(kind) {
                return Err(AppError::PayoutMethodDisabled(kind));
            }
            ensure_complete(&preferences, kind)?;
        }

        let saved = self.store.save_preferences(&preferences).await?;
        tracing::info!(%payee, default_method = ?saved.default_payment_method, "Payment preferences updated");
        Ok(saved)
    }

    /// Oldest first.
    pub async fn payout_history(&self, payee: Payee) -> Result<Vec<PayoutRecord>, AppError> {
        self.store.payout_history(payee).await
    }

    /// Newest first, optionally restricted to one kind of payee.
    pub async fn recent_payouts(
        &self,
        kind: Option<PayeeKind>,
        limit: i64,
    ) -> Result<Vec<PayoutRecord>, AppError> {
        self.store.list_payouts(kind, limit).await
    }
}

fn ensure_complete(preferences: &PaymentPreferences, kind: PayoutMethodKind) -> Result<(), AppError> {
    let missing = preferences.missing_fields(kind);
    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::MissingPayoutDetails {
        method: kind,
        fields: missing.join(", "),
    })
}
