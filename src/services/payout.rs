//! Payout routing.
//!
//! A payout goes to exactly one channel: the payee's selected default method. Channels do
//! not move money; they validate the destination, mint a transaction id and return
//! `pending_manual` so an operator can complete the transfer. Every attempt, successful or
//! not, lands in the payout history.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::traits::{NotificationSink, PaymentPreferencesStore};
use crate::error::AppError;
use crate::models::notification::{NewNotification, NotificationKind};
use crate::models::payment_preferences::{
    CappedAppend, NewPayoutRecord, Payee, PayeeKind, PaymentPreferences, PayoutMethodKind,
    PayoutRecord, PayoutStatus,
};
use crate::services::commission::format_cents;
use crate::services::notifications::notify_best_effort;

/// What a channel hands back after accepting a payout.
#[derive(Debug, Clone)]
pub struct ChannelReceipt {
    pub transaction_id: String,
    pub status: PayoutStatus,
    /// Destination summary, safe to store and show
    pub details: serde_json::Value,
}

#[async_trait]
pub trait PayoutChannel: Send + Sync {
    fn kind(&self) -> PayoutMethodKind;

    async fn dispatch(
        &self,
        preferences: &PaymentPreferences,
        amount_cents: i64,
        currency: &str,
    ) -> Result<ChannelReceipt, AppError>;
}

/// `{prefix}_{unix millis}_{random}`
pub fn manual_transaction_id(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!(
        "{prefix}_{}_{}",
        Utc::now().timestamp_millis(),
        suffix.to_uppercase()
    )
}

fn require_details(preferences: &PaymentPreferences, kind: PayoutMethodKind) -> Result<(), AppError> {
    let missing = preferences.missing_fields(kind);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::MissingPayoutDetails {
            method: kind,
            fields: missing.join(", "),
        })
    }
}

/// Keep only the last four characters.
fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let visible = chars.len().min(4);
    let hidden = chars.len() - visible;
    "*".repeat(hidden) + &chars[hidden..].iter().collect::<String>()
}

fn manual_receipt(prefix: &str, details: serde_json::Value) -> ChannelReceipt {
    ChannelReceipt {
        transaction_id: manual_transaction_id(prefix),
        status: PayoutStatus::PendingManual,
        details,
    }
}

pub struct MobileMoneyChannel;

#[async_trait]
impl PayoutChannel for MobileMoneyChannel {
    fn kind(&self) -> PayoutMethodKind {
        PayoutMethodKind::MobileMoney
    }

    async fn dispatch(
        &self,
        preferences: &PaymentPreferences,
        _amount_cents: i64,
        _currency: &str,
    ) -> Result<ChannelReceipt, AppError> {
        require_details(preferences, self.kind())?;
        let block = &preferences.mobile_money;
        Ok(manual_receipt(
            "MM",
            json!({
                "provider": block.provider,
                "country": block.country,
                "phoneNumber": block.phone_number.as_deref().map(mask),
            }),
        ))
    }
}

pub struct BankTransferChannel;

#[async_trait]
impl PayoutChannel for BankTransferChannel {
    fn kind(&self) -> PayoutMethodKind {
        PayoutMethodKind::BankAccount
    }

    async fn dispatch(
        &self,
        preferences: &PaymentPreferences,
        _amount_cents: i64,
        _currency: &str,
    ) -> Result<ChannelReceipt, AppError> {
        require_details(preferences, self.kind())?;
        let block = &preferences.bank_account;
        Ok(manual_receipt(
            "BANK",
            json!({
                "accountHolderName": block.account_holder_name,
                "bankName": block.bank_name,
                "bankCode": block.bank_code,
                "country": block.country,
                "accountNumber": block.account_number.as_deref().map(mask),
            }),
        ))
    }
}

pub struct PaypalChannel;

#[async_trait]
impl PayoutChannel for PaypalChannel {
    fn kind(&self) -> PayoutMethodKind {
        PayoutMethodKind::Paypal
    }

    async fn dispatch(
        &self,
        preferences: &PaymentPreferences,
        _amount_cents: i64,
        _currency: &str,
    ) -> Result<ChannelReceipt, AppError> {
        require_details(preferences, self.kind())?;
        Ok(manual_receipt(
            "PP",
            json!({ "email": preferences.paypal.email }),
        ))
    }
}

pub struct CryptoWalletChannel;

#[async_trait]
impl PayoutChannel for CryptoWalletChannel {
    fn kind(&self) -> PayoutMethodKind {
        PayoutMethodKind::CryptoWallet
    }

    async fn dispatch(
        &self,
        preferences: &PaymentPreferences,
        _amount_cents: i64,
        _currency: &str,
    ) -> Result<ChannelReceipt, AppError> {
        require_details(preferences, self.kind())?;
        let block = &preferences.crypto_wallet;
        Ok(manual_receipt(
            "CRYPTO",
            json!({
                "network": block.network,
                "walletAddress": block.wallet_address,
            }),
        ))
    }
}

/// Outcome of a successful payout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutResult {
    pub record_id: i64,
    pub status: PayoutStatus,
    pub method: PayoutMethodKind,
    pub transaction_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub details: serde_json::Value,
}

#[derive(Clone)]
pub struct PayoutRouter {
    preferences: Arc<dyn PaymentPreferencesStore>,
    notifications: Arc<dyn NotificationSink>,
    channels: HashMap<PayoutMethodKind, Arc<dyn PayoutChannel>>,
}

impl PayoutRouter {
    /// Router with the four built-in channels.
    pub fn new(
        preferences: Arc<dyn PaymentPreferencesStore>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            preferences,
            notifications,
            channels: HashMap::new(),
        }
        .with_channel(Arc::new(MobileMoneyChannel))
        .with_channel(Arc::new(BankTransferChannel))
        .with_channel(Arc::new(PaypalChannel))
        .with_channel(Arc::new(CryptoWalletChannel))
    }

    /// Register (or replace) the channel for its method.
    pub fn with_channel(mut self, channel: Arc<dyn PayoutChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    /// Pay `amount_cents` to `payee` through their default method.
    ///
    /// `context` is stored with the history record (order ids, initiator, notes).
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: non-positive amount (nothing recorded)
    /// - `NoPaymentPreferences`, `NoDefaultPaymentMethod`, `PayoutMethodDisabled`,
    ///   `MissingPayoutDetails`: recorded as a `failed` history entry
    /// - `Database`: storage fault
    pub async fn process_payout(
        &self,
        payee: Payee,
        amount_cents: i64,
        currency: &str,
        context: serde_json::Value,
    ) -> Result<PayoutResult, AppError> {
        self.pay(payee, amount_cents, currency, context, None).await
    }

    /// Like [`process_payout`](Self::process_payout), but the success record is only
    /// written while all non-failed payouts to the payee's kind in `currency` stay within
    /// `ceiling_cents`. Otherwise nothing is recorded and `InsufficientCommission` is returned.
    pub async fn process_capped_payout(
        &self,
        payee: Payee,
        amount_cents: i64,
        currency: &str,
        context: serde_json::Value,
        ceiling_cents: i64,
    ) -> Result<PayoutResult, AppError> {
        self.pay(payee, amount_cents, currency, context, Some(ceiling_cents))
            .await
    }

    /// The payout already made to `payee` for `order_id`, if any.
    pub async fn find_order_payout(
        &self,
        payee: Payee,
        order_id: Uuid,
    ) -> Result<Option<PayoutRecord>, AppError> {
        self.preferences.find_order_payout(payee, order_id).await
    }

    async fn pay(
        &self,
        payee: Payee,
        amount_cents: i64,
        currency: &str,
        context: serde_json::Value,
        ceiling_cents: Option<i64>,
    ) -> Result<PayoutResult, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidRequest(
                "Payout amount must be positive".to_string(),
            ));
        }

        let (method, attempt) = self.dispatch(payee, amount_cents, currency).await;
        let receipt = match attempt {
            Ok(receipt) => receipt,
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => {
                tracing::warn!(%payee, amount_cents, currency, "Payout failed: {}", e);
                self.preferences
                    .append_payout(NewPayoutRecord {
                        payee,
                        amount_cents,
                        currency: currency.to_string(),
                        method,
                        status: PayoutStatus::Failed,
                        transaction_id: None,
                        details: json!({ "error": e.to_string(), "context": context }),
                    })
                    .await?;
                return Err(e);
            }
        };
        // dispatch only succeeds once a method was resolved
        let method = method.ok_or(AppError::NoDefaultPaymentMethod)?;

        let new_record = NewPayoutRecord {
            payee,
            amount_cents,
            currency: currency.to_string(),
            method: Some(method),
            status: receipt.status,
            transaction_id: Some(receipt.transaction_id.clone()),
            details: json!({ "destination": receipt.details, "context": context }),
        };
        let record = match ceiling_cents {
            None => self.preferences.append_payout(new_record).await?,
            Some(ceiling) => match self
                .preferences
                .append_payout_within(new_record, ceiling)
                .await?
            {
                CappedAppend::Recorded(record) => record,
                CappedAppend::Exceeded { withdrawn_cents } => {
                    tracing::warn!(
                        %payee,
                        amount_cents,
                        currency,
                        withdrawn_cents,
                        ceiling,
                        "Payout exceeds ceiling, not recorded"
                    );
                    return Err(AppError::InsufficientCommission {
                        requested_cents: amount_cents,
                        available_cents: (ceiling - withdrawn_cents).max(0),
                        currency: currency.to_string(),
                    });
                }
            },
        };

        tracing::info!(
            %payee,
            amount_cents,
            currency,
            %method,
            transaction_id = %receipt.transaction_id,
            status = receipt.status.as_str(),
            "Payout recorded"
        );

        let kind = match payee.kind {
            PayeeKind::Vendor => NotificationKind::Payout,
            PayeeKind::Admin => NotificationKind::CommissionWithdrawal,
        };
        notify_best_effort(
            self.notifications.as_ref(),
            NewNotification {
                recipient_id: payee.id,
                kind,
                title: "Payout initiated".to_string(),
                message: format!(
                    "Payout of {} {} via {} is {}.",
                    format_cents(amount_cents),
                    currency,
                    method,
                    receipt.status.as_str()
                ),
                data: json!({
                    "payoutId": record.id,
                    "transactionId": receipt.transaction_id,
                    "amountCents": amount_cents,
                    "currency": currency,
                    "method": method,
                    "status": receipt.status,
                }),
            },
        )
        .await;

        Ok(PayoutResult {
            record_id: record.id,
            status: receipt.status,
            method,
            transaction_id: receipt.transaction_id,
            amount_cents,
            currency: currency.to_string(),
            details: record.details,
        })
    }

    /// Resolve the payee's method and run its channel. The method is returned even on
    /// failure so the history entry can name it.
    async fn dispatch(
        &self,
        payee: Payee,
        amount_cents: i64,
        currency: &str,
    ) -> (Option<PayoutMethodKind>, Result<ChannelReceipt, AppError>) {
        let preferences = match self.preferences.find_preferences(payee).await {
            Ok(Some(preferences)) => preferences,
            Ok(None) => return (None, Err(AppError::NoPaymentPreferences)),
            Err(e) => return (None, Err(e)),
        };
        let Some(method) = preferences.default_payment_method else {
            return (None, Err(AppError::NoDefaultPaymentMethod));
        };
        if !preferences.is_enabled(method) {
            return (Some(method), Err(AppError::PayoutMethodDisabled(method)));
        }
        let Some(channel) = self.channels.get(&method) else {
            return (Some(method), Err(AppError::PayoutMethodDisabled(method)));
        };
        (
            Some(method),
            channel.dispatch(&preferences, amount_cents, currency).await,
        )
    }
}
