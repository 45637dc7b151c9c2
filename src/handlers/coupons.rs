use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{created_response, AppJson};
use crate::entities::coupon::Model as CouponModel;
use crate::errors::ServiceError;
use crate::services::coupons::CreateCouponRequest;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponCreatedResponse {
    pub message: String,
    pub coupon: CouponModel,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

// GET /api/v1/coupons/active
#[utoipa::path(
    get,
    path = "/api/v1/coupons/active",
    responses(
        (status = 200, description = "Active, unexpired coupons, newest first", body = [CouponModel])
    ),
    tag = "Coupons"
)]
pub async fn list_active_coupons(
    State(state): State<AppState>,
) -> Result<Json<Vec<CouponModel>>, ServiceError> {
    Ok(Json(state.services.coupons.list_active().await?))
}

// GET /api/v1/admin/coupons
#[utoipa::path(
    get,
    path = "/api/v1/admin/coupons",
    responses(
        (status = 200, description = "All coupons, newest first", body = [CouponModel]),
        (status = 401, description = "Missing or invalid API key", body = crate::errors::ErrorResponse)
    ),
    security(("api_key" = [])),
    tag = "Coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
) -> Result<Json<Vec<CouponModel>>, ServiceError> {
    Ok(Json(state.services.coupons.list().await?))
}

// POST /api/v1/admin/coupons
#[utoipa::path(
    post,
    path = "/api/v1/admin/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = CouponCreatedResponse),
        (status = 400, description = "Invalid coupon definition", body = crate::errors::ErrorResponse),
        (status = 409, description = "Coupon code already exists", body = crate::errors::ErrorResponse)
    ),
    security(("api_key" = [])),
    tag = "Coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.create(request).await?;
    Ok(created_response(CouponCreatedResponse {
        message: "Coupon created successfully".to_string(),
        coupon,
    }))
}

// DELETE /api/v1/admin/coupons/:id
#[utoipa::path(
    delete,
    path = "/api/v1/admin/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon deleted", body = MessageResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse)
    ),
    security(("api_key" = [])),
    tag = "Coupons"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.services.coupons.delete(id).await?;
    Ok(Json(MessageResponse {
        message: "Coupon deleted successfully".to_string(),
    }))
}
