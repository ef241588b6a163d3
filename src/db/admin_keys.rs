//! PostgreSQL admin key lookup and health check.

use async_trait::async_trait;

use super::PgStore;
use crate::db::traits::{AdminKeyStore, HealthCheck};
use crate::error::AppError;
use crate::models::admin_key::AdminApiKey;

#[async_trait]
impl AdminKeyStore for PgStore {
    async fn find_active_key(&self, key_hash: &str) -> Result<Option<AdminApiKey>, AppError> {
        let key = sqlx::query_as::<_, AdminApiKey>(
            "SELECT id, admin_id, key_hash, display_name, role, created_at, is_active
             FROM admin_api_keys
             WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key)
    }
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        // Verify database connectivity with simple query
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
