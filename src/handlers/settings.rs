//! Marketplace settings endpoints.

use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};

use crate::app::AppState;
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::middleware::auth::AuthContext;
use crate::models::settings::UpdateCommissionRateRequest;

/// `GET /api/admin/settings/commission-rate`
pub async fn get_commission_rate(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let settings = state.settings.marketplace_settings().await?;
    Ok(ApiResponse::ok("Commission rate retrieved", settings))
}

/// `PUT /api/admin/settings/commission-rate`
///
/// ```json
/// { "commissionRate": 0.12 }
/// ```
///
/// Takes effect for the next calculation; already recorded payouts are not touched.
pub async fn update_commission_rate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdateCommissionRateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let settings = state
        .settings
        .set_commission_rate(request.commission_rate, auth.admin_id)
        .await?;
    tracing::info!(admin_id = %auth.admin_id, admin = %auth.display_name, rate = %settings.commission_rate, "Commission rate updated");
    Ok(ApiResponse::ok("Commission rate updated", settings))
}
