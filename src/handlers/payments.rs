use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common::{created_response, success_response, AppJson};
use crate::entities::coupon::DiscountType;
use crate::entities::order::Model as OrderModel;
use crate::errors::ServiceError;
use crate::services::orders::SaveOrderRequest;
use crate::services::payments::{CreatePaymentIntentRequest, CreatePaymentIntentResponse};
use crate::AppState;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    pub code: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponResponse {
    pub success: bool,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    #[schema(value_type = Option<f64>)]
    pub discount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_type: Option<DiscountType>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    #[schema(value_type = Option<f64>)]
    pub final_total: Option<Decimal>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaveOrderResponse {
    pub message: String,
    pub order: OrderModel,
}

// POST /api/v1/payment/create-payment-intent
#[utoipa::path(
    post,
    path = "/api/v1/payment/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = CreatePaymentIntentResponse),
        (status = 400, description = "Invalid cart or amount below the gateway minimum", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreatePaymentIntentRequest>,
) -> Result<Json<CreatePaymentIntentResponse>, ServiceError> {
    let response = state
        .services
        .payments
        .create_payment_intent(request)
        .await?;
    Ok(Json(response))
}

// POST /api/v1/payment/apply-coupon
#[utoipa::path(
    post,
    path = "/api/v1/payment/apply-coupon",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon applied", body = ApplyCouponResponse),
        (status = 400, description = "Coupon expired, below minimum or exhausted", body = ApplyCouponResponse),
        (status = 401, description = "Coupon requires a signed-in customer", body = ApplyCouponResponse),
        (status = 404, description = "Unknown coupon code", body = ApplyCouponResponse)
    ),
    tag = "Payments"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    AppJson(request): AppJson<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state
        .services
        .coupons
        .evaluate(&request.code, request.subtotal, request.user_id.as_deref())
        .await;

    match result {
        Ok(quote) => Ok((
            StatusCode::OK,
            Json(ApplyCouponResponse {
                success: true,
                discount: Some(quote.discount),
                discount_type: Some(quote.discount_type),
                final_total: Some(quote.final_total),
                message: "Coupon applied successfully".to_string(),
            }),
        )),
        Err(ServiceError::CouponRejected(rejection)) => Ok((
            rejection.status_code(),
            Json(ApplyCouponResponse {
                success: false,
                discount: None,
                discount_type: None,
                final_total: None,
                message: rejection.to_string(),
            }),
        )),
        Err(other) => Err(other),
    }
}

// POST /api/v1/payment/save-order
#[utoipa::path(
    post,
    path = "/api/v1/payment/save-order",
    request_body = SaveOrderRequest,
    responses(
        (status = 201, description = "Order saved", body = SaveOrderResponse),
        (status = 200, description = "Order for this payment intent already saved", body = SaveOrderResponse),
        (status = 400, description = "Missing fields, unconfirmed payment or coupon rejected", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn save_order(
    State(state): State<AppState>,
    AppJson(request): AppJson<SaveOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, created) = state.services.orders.save_order(request).await?;
    let response = if created {
        created_response(SaveOrderResponse {
            message: "Order saved".to_string(),
            order,
        })
    } else {
        success_response(SaveOrderResponse {
            message: "Order already saved".to_string(),
            order,
        })
    };
    Ok(response)
}
