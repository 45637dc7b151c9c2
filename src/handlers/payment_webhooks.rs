use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::json;
use tracing::{error, info, warn};

use crate::errors::ServiceError;
use crate::gateway::webhook::{WebhookEvent, SIGNATURE_HEADER};
use crate::AppState;

fn webhook_error(message: impl std::fmt::Display) -> Response {
    (StatusCode::BAD_REQUEST, format!("Webhook Error: {}", message)).into_response()
}

// POST /api/v1/payment/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payment/webhook",
    request_body(content = String, description = "Raw event payload exactly as signed by Stripe"),
    responses(
        (status = 200, description = "Event acknowledged with `{\"received\": true}`"),
        (status = 400, description = "Signature verification failed or payload unreadable", body = String),
        (status = 503, description = "Webhook signing secret not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(verifier) = state.services.webhook_verifier.clone() else {
        error!("Payment webhook received but no signing secret is configured");
        return ServiceError::ServiceUnavailable("webhook signing secret not configured".to_string())
            .into_response();
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(err) = verifier.verify(signature, &body, chrono::Utc::now().timestamp()) {
        warn!(error = %err, "Payment webhook signature verification failed");
        return webhook_error(err);
    }

    let event = match WebhookEvent::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "Payment webhook payload is not a valid event");
            return webhook_error(err);
        }
    };
    let event_id = event.id.clone().unwrap_or_default();
    let event_type = event.event_type.clone();

    let payment_event = match event.into_payment_event() {
        Ok(payment_event) => payment_event,
        Err(err) => {
            warn!(%event_id, %event_type, error = %err, "Payment webhook object is not a payment intent");
            return webhook_error(err);
        }
    };

    // Store failures surface as 5xx so the gateway redelivers
    match state.services.orders.reconcile(payment_event).await {
        Ok(outcome) => {
            info!(%event_id, %event_type, ?outcome, "Payment webhook processed");
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(err) => err.into_response(),
    }
}
