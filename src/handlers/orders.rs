use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{created_response, AppJson};
use crate::entities::order::Model as OrderModel;
use crate::errors::ServiceError;
use crate::services::orders::{CreateOrderRequest, UpdateOrderStatusRequest};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderCreatedResponse {
    pub message: String,
    pub order: OrderModel,
}

// POST /api/v1/orders
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed, awaiting payment", body = OrderCreatedResponse),
        (status = 400, description = "Missing or invalid order details", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_order(request).await?;
    Ok(created_response(OrderCreatedResponse {
        message: "Order created successfully".to_string(),
        order,
    }))
}

// GET /api/v1/admin/orders
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    responses(
        (status = 200, description = "All orders, newest first", body = [OrderModel]),
        (status = 401, description = "Missing or invalid API key", body = crate::errors::ErrorResponse)
    ),
    security(("api_key" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
) -> Result<Json<Vec<OrderModel>>, ServiceError> {
    Ok(Json(state.services.orders.list_orders().await?))
}

// GET /api/v1/admin/orders/:id
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found", body = OrderModel),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("api_key" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderModel>, ServiceError> {
    Ok(Json(state.services.orders.get_order(id).await?))
}

// PUT /api/v1/admin/orders/:id/status
#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = OrderModel),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("api_key" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(request): AppJson<UpdateOrderStatusRequest>,
) -> Result<Json<OrderModel>, ServiceError> {
    Ok(Json(
        state
            .services
            .orders
            .update_status(id, &request.status)
            .await?,
    ))
}
