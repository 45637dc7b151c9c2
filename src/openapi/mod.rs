use axum::Json;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Checkout API

Checkout backend for the storefront: coupon evaluation, Stripe payment intents
and order reconciliation.

## Checkout flow

1. `POST /payment/apply-coupon` previews a discount for the cart subtotal
2. `POST /payment/create-payment-intent` creates a card intent for the amount due
3. The client confirms the payment with Stripe
4. `POST /payment/save-order` re-checks the intent and records the order
5. Stripe calls `POST /payment/webhook`; the order converges on the same state

## Authentication

Operator endpoints under `/admin` require the `x-api-key` header.

## Error Handling

```json
{
  "error": "Bad Request",
  "message": "Payment not completed",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Payments", description = "Payment intents, coupon preview, order save and webhook"),
        (name = "Coupons", description = "Coupon listing and administration"),
        (name = "Orders", description = "Order placement and administration")
    ),
    paths(
        // Payments
        crate::handlers::payments::create_payment_intent,
        crate::handlers::payments::apply_coupon,
        crate::handlers::payments::save_order,
        crate::handlers::payment_webhooks::payment_webhook,
        // Coupons
        crate::handlers::coupons::list_active_coupons,
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::delete_coupon,
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
    ),
    components(
        schemas(
            crate::entities::coupon::Model,
            crate::entities::coupon::DiscountType,
            crate::entities::order::Model,
            crate::entities::order::OrderItem,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::PaymentMethod,
            crate::errors::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    crate::middleware_helpers::admin_key::ADMIN_KEY_HEADER,
                ))),
            );
        }
    }
}

/// Serves the generated OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
