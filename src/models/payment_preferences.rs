//! Payout preferences for vendors and the platform admin, and the payout ledger.
//!
//! Each payee has one preferences document holding four payout method blocks and a
//! selected default. Payout attempts are recorded in a separate insert-only table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayeeKind {
    Vendor,
    Admin,
}

impl PayeeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayeeKind::Vendor => "vendor",
            PayeeKind::Admin => "admin",
        }
    }
}

impl FromStr for PayeeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vendor" => Ok(PayeeKind::Vendor),
            "admin" => Ok(PayeeKind::Admin),
            other => Err(format!("Unknown payee kind: {other}")),
        }
    }
}

/// Someone who can receive money: a vendor, or the platform admin withdrawing commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payee {
    pub kind: PayeeKind,
    pub id: Uuid,
}

impl Payee {
    pub fn vendor(id: Uuid) -> Self {
        Self {
            kind: PayeeKind::Vendor,
            id,
        }
    }

    pub fn admin(id: Uuid) -> Self {
        Self {
            kind: PayeeKind::Admin,
            id,
        }
    }
}

impl fmt::Display for Payee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayoutMethodKind {
    MobileMoney,
    BankAccount,
    Paypal,
    CryptoWallet,
}

impl PayoutMethodKind {
    pub const ALL: [PayoutMethodKind; 4] = [
        PayoutMethodKind::MobileMoney,
        PayoutMethodKind::BankAccount,
        PayoutMethodKind::Paypal,
        PayoutMethodKind::CryptoWallet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethodKind::MobileMoney => "mobileMoney",
            PayoutMethodKind::BankAccount => "bankAccount",
            PayoutMethodKind::Paypal => "paypal",
            PayoutMethodKind::CryptoWallet => "cryptoWallet",
        }
    }
}

impl fmt::Display for PayoutMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutMethodKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PayoutMethodKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown payout method: {s}"))
    }
}

/// Returns the names of the fields that are absent or blank.
fn blank_fields<'a>(fields: &[(&'a str, &Option<String>)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileMoneyDetails {
    #[serde(default)]
    pub enabled: bool,
    pub phone_number: Option<String>,
    /// e.g. MTN, Airtel, M-Pesa
    pub provider: Option<String>,
    pub country: Option<String>,
}

impl MobileMoneyDetails {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("phoneNumber", &self.phone_number),
            ("provider", &self.provider),
            ("country", &self.country),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountDetails {
    #[serde(default)]
    pub enabled: bool,
    pub account_holder_name: Option<String>,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub country: Option<String>,
    pub bank_code: Option<String>,
}

impl BankAccountDetails {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("accountHolderName", &self.account_holder_name),
            ("bankName", &self.bank_name),
            ("accountNumber", &self.account_number),
            ("country", &self.country),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaypalDetails {
    #[serde(default)]
    pub enabled: bool,
    pub email: Option<String>,
}

impl PaypalDetails {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = blank_fields(&[("email", &self.email)]);
        if missing.is_empty() && !self.email.as_deref().is_some_and(|e| e.contains('@')) {
            missing.push("email");
        }
        missing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoWalletDetails {
    #[serde(default)]
    pub enabled: bool,
    pub wallet_address: Option<String>,
    /// e.g. ethereum, polygon, bsc
    pub network: Option<String>,
}

impl CryptoWalletDetails {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("walletAddress", &self.wallet_address),
            ("network", &self.network),
        ])
    }
}

/// One payee's payout preferences.
///
/// # Database Table
///
/// Maps to `payment_preferences`, unique on `(payee_kind, payee_id)`. Created lazily on
/// first read or write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPreferences {
    pub id: Uuid,
    pub payee: Payee,
    pub mobile_money: MobileMoneyDetails,
    pub bank_account: BankAccountDetails,
    pub paypal: PaypalDetails,
    pub crypto_wallet: CryptoWalletDetails,
    pub default_payment_method: Option<PayoutMethodKind>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentPreferences {
    /// An empty document with every method disabled.
    pub fn empty(payee: Payee) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payee,
            mobile_money: MobileMoneyDetails::default(),
            bank_account: BankAccountDetails::default(),
            paypal: PaypalDetails::default(),
            crypto_wallet: CryptoWalletDetails::default(),
            default_payment_method: None,
            is_verified: false,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_enabled(&self, kind: PayoutMethodKind) -> bool {
        match kind {
            PayoutMethodKind::MobileMoney => self.mobile_money.enabled,
            PayoutMethodKind::BankAccount => self.bank_account.enabled,
            PayoutMethodKind::Paypal => self.paypal.enabled,
            PayoutMethodKind::CryptoWallet => self.crypto_wallet.enabled,
        }
    }

    pub fn missing_fields(&self, kind: PayoutMethodKind) -> Vec<&'static str> {
        match kind {
            PayoutMethodKind::MobileMoney => self.mobile_money.missing_fields(),
            PayoutMethodKind::BankAccount => self.bank_account.missing_fields(),
            PayoutMethodKind::Paypal => self.paypal.missing_fields(),
            PayoutMethodKind::CryptoWallet => self.crypto_wallet.missing_fields(),
        }
    }

    /// Merge a partial update into this document. Blocks present in the update replace
    /// the stored block wholesale.
    pub fn apply_update(&mut self, update: UpdatePaymentPreferencesRequest) {
        if let Some(block) = update.mobile_money {
            self.mobile_money = block;
        }
        if let Some(block) = update.bank_account {
            self.bank_account = block;
        }
        if let Some(block) = update.paypal {
            self.paypal = block;
        }
        if let Some(block) = update.crypto_wallet {
            self.crypto_wallet = block;
        }
        if let Some(kind) = update.default_payment_method {
            self.default_payment_method = Some(kind);
        }
        self.updated_at = Utc::now();
    }
}

/// Body of `PUT .../payment-preferences`.
///
/// # JSON Example
///
/// ```json
/// {
///   "paypal": { "enabled": true, "email": "vendor@example.com" },
///   "defaultPaymentMethod": "paypal"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentPreferencesRequest {
    pub mobile_money: Option<MobileMoneyDetails>,
    pub bank_account: Option<BankAccountDetails>,
    pub paypal: Option<PaypalDetails>,
    pub crypto_wallet: Option<CryptoWalletDetails>,
    pub default_payment_method: Option<PayoutMethodKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Intent recorded; an operator completes the transfer out-of-band
    PendingManual,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::PendingManual => "pending_manual",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_manual" => Ok(PayoutStatus::PendingManual),
            "completed" => Ok(PayoutStatus::Completed),
            "failed" => Ok(PayoutStatus::Failed),
            other => Err(format!("Unknown payout status: {other}")),
        }
    }
}

/// One payout attempt in the insert-only `payout_history` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRecord {
    pub id: i64,
    pub payee: Payee,
    pub amount_cents: i64,
    pub currency: String,
    pub method: Option<PayoutMethodKind>,
    pub status: PayoutStatus,
    pub transaction_id: Option<String>,
    pub details: serde_json::Value,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayoutRecord {
    pub payee: Payee,
    pub amount_cents: i64,
    pub currency: String,
    pub method: Option<PayoutMethodKind>,
    pub status: PayoutStatus,
    pub transaction_id: Option<String>,
    pub details: serde_json::Value,
}

/// Result of appending a payout under a ceiling.
#[derive(Debug, Clone, PartialEq)]
pub enum CappedAppend {
    Recorded(PayoutRecord),
    /// Nothing written. `withdrawn_cents` is what was already paid out at the time.
    Exceeded { withdrawn_cents: i64 },
}

/// Body of a manual vendor payout or a commission withdrawal.
///
/// # JSON Example
///
/// ```json
/// { "amountCents": 250000, "currency": "NGN", "notes": "March settlement" }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_kinds_use_camel_case_names() {
        assert_eq!(
            serde_json::to_value(PayoutMethodKind::CryptoWallet).unwrap(),
            "cryptoWallet"
        );
        assert_eq!("bankAccount".parse(), Ok(PayoutMethodKind::BankAccount));
        assert!("cheque".parse::<PayoutMethodKind>().is_err());
    }

    #[test]
    fn blank_values_are_reported_missing() {
        let block = MobileMoneyDetails {
            enabled: true,
            phone_number: Some("  ".into()),
            provider: Some("MTN".into()),
            country: None,
        };
        assert_eq!(block.missing_fields(), vec!["phoneNumber", "country"]);
    }

    #[test]
    fn paypal_email_must_look_like_an_email() {
        let block = PaypalDetails {
            enabled: true,
            email: Some("not-an-email".into()),
        };
        assert_eq!(block.missing_fields(), vec!["email"]);
    }

    #[test]
    fn update_replaces_only_present_blocks() {
        let mut prefs = PaymentPreferences::empty(Payee::vendor(Uuid::new_v4()));
        prefs.bank_account.enabled = true;
        prefs.apply_update(UpdatePaymentPreferencesRequest {
            paypal: Some(PaypalDetails {
                enabled: true,
                email: Some("v@example.com".into()),
            }),
            default_payment_method: Some(PayoutMethodKind::Paypal),
            ..Default::default()
        });
        assert!(prefs.bank_account.enabled);
        assert!(prefs.is_enabled(PayoutMethodKind::Paypal));
        assert_eq!(prefs.default_payment_method, Some(PayoutMethodKind::Paypal));
    }
}
