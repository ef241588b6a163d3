//! HTTP handlers for platform commission.

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::middleware::auth::AuthContext;
use crate::models::payment_preferences::PayoutRequest;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitQuery {
    pub amount_cents: i64,
    pub currency: String,
}

/// `GET /api/admin/commission/split?amountCents=10000&currency=USD`
///
/// How an amount would be divided between vendor and platform at the current rate.
pub async fn preview_split(
    State(state): State<AppState>,
    Query(query): Query<SplitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let split = state
        .calculator
        .calculate_payout(query.amount_cents, &query.currency.trim().to_uppercase())
        .await?;
    Ok(ApiResponse::ok("Payout split calculated", split))
}

/// `GET /api/admin/commission/report`
///
/// Current rate, per-currency totals and the per-order breakdown.
pub async fn commission_report(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state.commission.report().await?;
    Ok(ApiResponse::ok("Commission report generated", report))
}

/// `GET /api/admin/commission/total`
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "message": "Commission totals calculated",
///   "data": [
///     { "currency": "USD", "orderCount": 3, "totalCommissionCents": 4200,
///       "withdrawnCents": 1000, "availableCents": 3200 }
///   ]
/// }
/// ```
pub async fn commission_total(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let totals = state.commission.calculate_total_commission().await?;
    Ok(ApiResponse::ok("Commission totals calculated", totals))
}

/// `POST /api/admin/commission/withdraw`
///
/// Pays commission out to the calling admin's default payout method. Fails with 422 when
/// the amount exceeds the available balance in that currency.
pub async fn withdraw_commission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<PayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.currency.trim().is_empty() {
        return Err(AppError::InvalidRequest("Currency is required".to_string()));
    }
    let result = state
        .commission
        .withdraw(
            auth.admin_id,
            request.amount_cents,
            &request.currency,
            request.notes,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("Commission withdrawal initiated", result),
    ))
}

/// `GET /api/admin/commission/history`
pub async fn withdrawal_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let history = state.commission.history(limit).await?;
    Ok(ApiResponse::ok("Withdrawal history retrieved", history))
}
