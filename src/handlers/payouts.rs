//! HTTP handlers for vendor payouts.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::middleware::auth::AuthContext;
use crate::models::payment_preferences::{Payee, PayeeKind, PayoutRequest};

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListPayoutsQuery {
    /// `vendor` or `admin`; both when absent
    pub kind: Option<PayeeKind>,
    pub limit: Option<i64>,
}

/// `GET /api/admin/payouts?kind=vendor&limit=50`
///
/// Payout history records, newest first.
pub async fn list_payouts(
    State(state): State<AppState>,
    Query(query): Query<ListPayoutsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let records = state.preferences.recent_payouts(query.kind, limit).await?;
    Ok(ApiResponse::ok("Payouts retrieved", records))
}

/// `POST /api/admin/payouts/process`
///
/// Runs the vendor payout sweep immediately instead of waiting for the next tick.
pub async fn process_vendor_payouts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(admin_id = %auth.admin_id, admin = %auth.display_name, "Manual vendor payout sweep requested");
    let report = state.vendor_payouts.run_sweep().await?;
    let message = if report.skipped {
        "A payout sweep is already running"
    } else {
        "Vendor payouts processed"
    };
    Ok(ApiResponse::ok(message, report))
}

/// `POST /api/admin/payouts/vendors/{vendor_id}`
///
/// Pays a vendor outside the sweep, through their default payout method.
///
/// # Response
///
/// 201 Created with the payout, or 422 if the vendor has no usable payout method (the
/// failed attempt is still recorded in their history).
pub async fn pay_vendor(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(vendor_id): Path<Uuid>,
    Json(request): Json<PayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let currency = request.currency.trim().to_uppercase();
    if currency.is_empty() {
        return Err(AppError::InvalidRequest("Currency is required".to_string()));
    }

    let result = state
        .payouts
        .process_payout(
            Payee::vendor(vendor_id),
            request.amount_cents,
            &currency,
            json!({
                "type": "manual",
                "initiatedBy": auth.admin_id,
                "notes": request.notes,
            }),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("Vendor payout initiated", result),
    ))
}

/// `GET /api/admin/payouts/vendors/{vendor_id}/history`
///
/// Oldest first.
pub async fn vendor_payout_history(
    State(state): State<AppState>,
    Path(vendor_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let history = state
        .preferences
        .payout_history(Payee::vendor(vendor_id))
        .await?;
    Ok(ApiResponse::ok("Payout history retrieved", history))
}
