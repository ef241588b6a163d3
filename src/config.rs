//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.
//!
//! The commission rate is deliberately absent here: it lives in the `settings` table
//! and is read per calculation (see [`crate::services::commission`]).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// A configuration value that must never end up in logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `FLW_SECRET_HASH`: shared secret Flutterwave sends in `verif-hash`, also the HMAC key
/// - `FLW_SECRET_KEY`: Flutterwave API key used for transaction re-verification
/// - `PAYSTACK_SECRET_KEY`: Paystack API key used for transaction re-verification
/// - `PAYSTACK_WEBHOOK_SECRET`: HMAC-SHA512 key for Paystack webhooks (falls back to `PAYSTACK_SECRET_KEY`)
/// - `FLUTTERWAVE_API_BASE`, `PAYSTACK_API_BASE`: provider API roots
/// - `PROVIDER_TIMEOUT_SECS`: timeout for outbound verification calls, defaults to 10
/// - `PAYOUT_SWEEP_INTERVAL_SECS`: vendor payout sweep period, defaults to 3600
/// - `PAYOUT_CLAIM_TTL_SECS`: how long a claimed order stays reserved by a sweep, defaults to 3600
/// - `PAYOUT_SWEEP_BATCH_SIZE`: orders claimed per sweep, defaults to 100
/// - `WEBHOOK_MAX_ATTEMPTS`: application attempts allowed per webhook event, defaults to 3
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub flw_secret_hash: Option<Secret>,

    #[serde(default)]
    pub flw_secret_key: Option<Secret>,

    #[serde(default)]
    pub paystack_secret_key: Option<Secret>,

    #[serde(default)]
    pub paystack_webhook_secret: Option<Secret>,

    #[serde(default = "default_flutterwave_api_base")]
    pub flutterwave_api_base: String,

    #[serde(default = "default_paystack_api_base")]
    pub paystack_api_base: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_payout_sweep_interval_secs")]
    pub payout_sweep_interval_secs: u64,

    #[serde(default = "default_payout_claim_ttl_secs")]
    pub payout_claim_ttl_secs: u64,

    #[serde(default = "default_payout_sweep_batch_size")]
    pub payout_sweep_batch_size: i64,

    #[serde(default = "default_webhook_max_attempts")]
    pub webhook_max_attempts: i32,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_flutterwave_api_base() -> String {
    "https://api.flutterwave.com/v3".to_string()
}

fn default_paystack_api_base() -> String {
    "https://api.paystack.co".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_payout_sweep_interval_secs() -> u64 {
    3600
}

fn default_payout_claim_ttl_secs() -> u64 {
    3600
}

fn default_payout_sweep_batch_size() -> i64 {
    100
}

fn default_webhook_max_attempts() -> i32 {
    3
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: flw_secret_hash -> FLW_SECRET_HASH
        envy::from_env::<Config>()
    }

    /// Secret used for Paystack webhook signatures.
    ///
    /// Paystack signs webhooks with the account's secret key, so a dedicated webhook
    /// secret is optional.
    pub fn paystack_signing_secret(&self) -> Option<&Secret> {
        self.paystack_webhook_secret
            .as_ref()
            .or(self.paystack_secret_key.as_ref())
            .filter(|s| !s.reveal().is_empty())
    }

    /// Secret used for Flutterwave webhook signatures.
    pub fn flutterwave_signing_secret(&self) -> Option<&Secret> {
        self.flw_secret_hash.as_ref().filter(|s| !s.reveal().is_empty())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// How long an in-flight webhook application may run before a redelivery takes it over.
    ///
    /// Twice the provider timeout covers the verification call and the order write, with a
    /// 30 second floor.
    pub fn webhook_recorded_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds((self.provider_timeout_secs as i64).saturating_mul(2).max(30))
    }

    pub fn payout_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.payout_sweep_interval_secs.max(1))
    }

    pub fn payout_claim_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.payout_claim_ttl_secs as i64)
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for tests: no database, fixed webhook secrets.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/unused".to_string(),
            server_port: 0,
            flw_secret_hash: Some(Secret::new("flw-test-hash")),
            flw_secret_key: Some(Secret::new("FLWSECK_TEST")),
            paystack_secret_key: Some(Secret::new("sk_test_paystack")),
            paystack_webhook_secret: None,
            flutterwave_api_base: default_flutterwave_api_base(),
            paystack_api_base: default_paystack_api_base(),
            provider_timeout_secs: 1,
            payout_sweep_interval_secs: 3600,
            payout_claim_ttl_secs: 3600,
            payout_sweep_batch_size: 100,
            webhook_max_attempts: 3,
        }
    }
}
