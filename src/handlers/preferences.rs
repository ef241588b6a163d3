//! HTTP handlers for payment preferences.
//!
//! Admins manage their own document (used for commission withdrawals) and any vendor's.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::middleware::auth::AuthContext;
use crate::models::payment_preferences::{Payee, UpdatePaymentPreferencesRequest};

/// `GET /api/admin/payment-preferences`
pub async fn get_admin_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, AppError> {
    let preferences = state.preferences.get(Payee::admin(auth.admin_id)).await?;
    Ok(ApiResponse::ok("Payment preferences retrieved", preferences))
}

/// `PUT /api/admin/payment-preferences`
///
/// Partial update: blocks present in the body replace the stored ones.
pub async fn update_admin_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdatePaymentPreferencesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let preferences = state
        .preferences
        .update(Payee::admin(auth.admin_id), request)
        .await?;
    Ok(ApiResponse::ok("Payment preferences updated", preferences))
}

/// `GET /api/admin/vendors/{vendor_id}/payment-preferences`
pub async fn get_vendor_preferences(
    State(state): State<AppState>,
    Path(vendor_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let preferences = state.preferences.get(Payee::vendor(vendor_id)).await?;
    Ok(ApiResponse::ok("Payment preferences retrieved", preferences))
}

/// `PUT /api/admin/vendors/{vendor_id}/payment-preferences`
pub async fn update_vendor_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(vendor_id): Path<Uuid>,
    Json(request): Json<UpdatePaymentPreferencesRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(admin_id = %auth.admin_id, %vendor_id, "Admin updating vendor payment preferences");
    let preferences = state
        .preferences
        .update(Payee::vendor(vendor_id), request)
        .await?;
    Ok(ApiResponse::ok("Payment preferences updated", preferences))
}
