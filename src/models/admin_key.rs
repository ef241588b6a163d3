//! Admin API key model for authentication.
//!
//! Admin keys are stored as SHA-256 hashes; the plaintext is only known to the holder.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents an admin API key record from the database.
///
/// # Database Table
///
/// Maps to the `admin_api_keys` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminApiKey {
    pub id: Uuid,

    /// User this key authenticates as
    pub admin_id: Uuid,

    /// SHA-256 hash of the actual key (64 hex characters)
    pub key_hash: String,

    pub display_name: String,

    /// Only `admin` may use the admin endpoints
    pub role: String,

    pub created_at: DateTime<Utc>,

    /// Inactive keys are rejected during authentication.
    pub is_active: bool,
}
