//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::models::order::OrderStatus;
use crate::models::payment_preferences::PayoutMethodKind;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Infrastructure Errors**: storage and serialization faults (retryable, 5xx)
/// - **Authentication Errors**: missing, invalid or under-privileged bearer keys
/// - **Resource Errors**: requested orders not found
/// - **Payout Errors**: payee has no usable payout method, or it is incomplete
/// - **Validation Errors**: invalid request data or status transitions
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored JSON document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bearer key is missing, invalid, or inactive.
    #[error("Invalid or missing credentials")]
    Unauthorized,

    /// Authenticated, but not an admin.
    #[error("Admin access required")]
    Forbidden,

    #[error("Order not found")]
    OrderNotFound,

    /// Request body or parameters are invalid.
    ///
    /// The String contains details about what was invalid.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Cannot change order status from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("No payment preferences configured for payee")]
    NoPaymentPreferences,

    #[error("No default payment method selected")]
    NoDefaultPaymentMethod,

    /// The selected default method is switched off. There is no fallback to another method.
    #[error("Payment method {0} is not enabled")]
    PayoutMethodDisabled(PayoutMethodKind),

    #[error("Missing {method} payout details: {fields}")]
    MissingPayoutDetails {
        method: PayoutMethodKind,
        fields: String,
    },

    #[error("Requested {requested_cents} exceeds available commission {available_cents} {currency}")]
    InsufficientCommission {
        requested_cents: i64,
        available_cents: i64,
        currency: String,
    },
}

impl AppError {
    /// True for storage/network faults, as opposed to client or business-rule errors.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Serialization(_))
    }
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in the same envelope as successful admin responses:
/// ```json
/// {
///   "success": false,
///   "code": "error_type",
///   "message": "Human-readable error message"
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::OrderNotFound => (StatusCode::NOT_FOUND, "order_not_found"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::InvalidStatusTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_status_transition")
            }
            AppError::NoPaymentPreferences => {
                (StatusCode::UNPROCESSABLE_ENTITY, "no_payment_preferences")
            }
            AppError::NoDefaultPaymentMethod => {
                (StatusCode::UNPROCESSABLE_ENTITY, "no_default_payment_method")
            }
            AppError::PayoutMethodDisabled(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "payout_method_disabled")
            }
            AppError::MissingPayoutDetails { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "missing_payout_details")
            }
            AppError::InsufficientCommission { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_commission")
            }
            AppError::Database(_) | AppError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        // Hide storage details from clients
        let message = if self.is_infrastructure() {
            tracing::error!("Internal error: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "success": false,
            "code": code,
            "message": message
        }));

        (status, body).into_response()
    }
}
