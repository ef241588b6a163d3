//! HTTP handlers for order status.

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
use crate::models::order::UpdateOrderStatusRequest;

/// `PATCH /api/admin/orders/{id}/status`
///
/// # Request Body
///
/// ```json
/// { "status": "shipped", "trackingNumber": "1Z999", "carrier": "DHL" }
/// ```
///
/// # Errors
///
/// - 400: status is not one of the settable values
/// - 404: order does not exist
/// - 409: transition not allowed from the current status
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .reconciler
        .update_order_status(order_id, &request.status, request.data, auth.admin_id)
        .await?;
    Ok(ApiResponse::ok(
        format!("Order status updated to {}", order.status),
        order,
    ))
}
