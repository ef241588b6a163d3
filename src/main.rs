//! Marketplace Payouts - Main Application Entry Point
//!
//! Payment confirmation, commission and payout service for a multi-vendor marketplace. It
//! receives signed payment webhooks from Flutterwave and Paystack, confirms orders, pays
//! vendors their share on a schedule and lets admins withdraw the platform commission.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: webhook signatures for providers, SHA-256 hashed bearer keys for admins
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build provider clients and services
//! 5. Start the vendor payout worker
//! 6. Start server on configured port

mod app;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::services::providers::{FlutterwaveClient, PaystackClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");
    if config.flutterwave_signing_secret().is_none() {
        tracing::warn!("FLW_SECRET_HASH is not set; Flutterwave webhooks will be rejected");
    }
    if config.paystack_signing_secret().is_none() {
        tracing::warn!("No Paystack secret is set; Paystack webhooks will be rejected");
    }

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(db::PgStore::new(pool));
    let flutterwave = FlutterwaveClient::new(
        &config.flutterwave_api_base,
        config.flw_secret_key.clone(),
        config.provider_timeout(),
    )?;
    let paystack = PaystackClient::new(
        &config.paystack_api_base,
        config.paystack_secret_key.clone(),
        config.provider_timeout(),
    )?;

    let state = app::AppState::new(
        &config,
        store.clone(),
        store,
        Arc::new(flutterwave),
        Arc::new(paystack),
    );

    // Runs for the lifetime of the process
    let _payout_worker = services::vendor_payouts::start_payout_worker(
        state.vendor_payouts.clone(),
        config.payout_sweep_interval(),
    );

    let router = app::build_router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, router).await?;

    Ok(())
}
