//! Marketplace settings.
//!
//! One record per settings `type`; this service only reads the `marketplace` record,
//! which carries the commission rate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Settings type holding the commission rate.
pub const MARKETPLACE_SETTINGS: &str = "marketplace";

/// Fraction of an order retained by the platform, held in basis points (1/100 of a percent).
///
/// Serialized as a fraction (`0.1` for 10%) to match what admins type in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommissionRate(u32);

impl CommissionRate {
    pub const MAX_BPS: u32 = 10_000;
    /// Applied when the marketplace settings record has never been written.
    pub const DEFAULT: CommissionRate = CommissionRate(1_000);

    pub fn from_bps(bps: u32) -> Option<Self> {
        (bps <= Self::MAX_BPS).then_some(Self(bps))
    }

    /// Converts a fraction in `[0, 1]`, rounded to the nearest basis point.
    pub fn from_fraction(fraction: f64) -> Option<Self> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return None;
        }
        Self::from_bps((fraction * f64::from(Self::MAX_BPS)).round() as u32)
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    pub fn as_fraction(&self) -> f64 {
        f64::from(self.0) / f64::from(Self::MAX_BPS)
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", f64::from(self.0) / 100.0)
    }
}

impl Serialize for CommissionRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_fraction())
    }
}

impl<'de> Deserialize<'de> for CommissionRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fraction = f64::deserialize(deserializer)?;
        CommissionRate::from_fraction(fraction).ok_or_else(|| {
            serde::de::Error::custom(format!("commission rate must be within [0, 1], got {fraction}"))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceSettings {
    pub commission_rate: CommissionRate,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        Self {
            commission_rate: CommissionRate::DEFAULT,
            updated_by: None,
            updated_at: None,
        }
    }
}

/// Body of `PUT /api/admin/settings/commission-rate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommissionRateRequest {
    pub commission_rate: CommissionRate,
}
