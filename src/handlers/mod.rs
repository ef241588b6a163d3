//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)
//!
//! Admin handlers answer with the [`ApiResponse`] envelope; webhook handlers answer with the
//! minimal provider-facing acknowledgment.

use axum::Json;
use serde::Serialize;

/// Commission reporting and withdrawal endpoints
pub mod commission;
pub mod health;
/// Order status endpoints
pub mod orders;
/// Payout endpoints
pub mod payouts;
/// Payment preference endpoints
pub mod preferences;
pub mod settings;
/// Payment provider webhook receivers
pub mod webhooks;

/// Admin response envelope.
///
/// ```json
/// { "success": true, "message": "Commission withdrawal initiated", "data": { ... } }
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}
