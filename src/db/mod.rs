//! Database connection pool, migrations and storage implementations.
//!
//! This module provides:
//! - The PostgreSQL connection pool and migration runner
//! - The storage traits the services are written against ([`traits`])
//! - [`PgStore`], the PostgreSQL implementation of every trait
//! - An in-memory implementation for tests

use sqlx::{Pool, Postgres};

mod admin_keys;
#[cfg(test)]
pub mod memory;
mod notifications;
mod orders;
mod payment_preferences;
mod settings;
pub mod traits;
mod webhook_events;

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// A connection pool maintains multiple database connections that can be reused across
/// HTTP requests and the payout sweep.
///
/// # Errors
///
/// Returns an error if:
/// - Database connection string is invalid
/// - Cannot connect to PostgreSQL server
/// - Database authentication fails
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        // Limit concurrent connections
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in a special `_sqlx_migrations` table, so each migration runs only once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro reads migrations at compile time from ./migrations directory
    sqlx::migrate!("./migrations").run(pool).await
}

/// PostgreSQL-backed storage.
///
/// Every mutation of a shared document (order logs, ledger status, payout history) is a
/// single SQL statement, so concurrent writers never lose each other's updates.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Stored enum columns that no longer parse indicate corrupt rows.
fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}
