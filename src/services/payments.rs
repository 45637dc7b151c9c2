use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::gateway::{
    CreateIntentRequest, PaymentGateway, PaymentIntent, GUEST_USER, METADATA_ORDER_ID,
    METADATA_USER_ID,
};
use crate::services::coupons::CouponService;

const METADATA_COUPON_CODE: &str = "couponCode";

/// Priced cart line used to compute the charge
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Pending order to reconcile when the gateway reports the outcome
    #[serde(default)]
    pub order_id: Option<Uuid>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    /// Pre-discount subtotal, present when a coupon was applied
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    #[schema(value_type = Option<f64>)]
    pub usd_subtotal: Option<Decimal>,
    /// Charged amount in minor units, present when a coupon was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in_cents: Option<i64>,
}

/// Converts a major-unit amount to minor units, rounding half away from zero
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| ServiceError::ValidationError("amount is out of range".to_string()))
}

/// Sum of `price * quantity` over the cart
pub fn cart_subtotal(items: &[CartLine]) -> Result<Decimal, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "items must not be empty".to_string(),
        ));
    }

    items.iter().try_fold(Decimal::ZERO, |acc, item| {
        if item.quantity == 0 {
            return Err(ServiceError::ValidationError(
                "item quantity must be greater than 0".to_string(),
            ));
        }
        if item.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "item price must not be negative".to_string(),
            ));
        }
        item.price
            .checked_mul(Decimal::from(item.quantity))
            .and_then(|line| acc.checked_add(line))
            .ok_or_else(|| ServiceError::ValidationError("cart total is out of range".to_string()))
    })
}

/// Lowercases and checks a three-letter ISO 4217 code
pub fn normalize_currency(currency: &str) -> Result<String, ServiceError> {
    let currency = currency.trim().to_ascii_lowercase();
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_lowercase()) {
        Ok(currency)
    } else {
        Err(ServiceError::ValidationError(format!(
            "unsupported currency '{}'",
            currency
        )))
    }
}

/// Creates gateway intents for checkout totals and confirms them before orders are saved
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    coupons: CouponService,
    min_charge_minor: i64,
    default_currency: String,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        coupons: CouponService,
        min_charge_minor: i64,
        default_currency: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            coupons,
            min_charge_minor,
            default_currency: default_currency.into(),
        }
    }

    #[instrument(skip(self, request), fields(items = request.items.len(), order_id = ?request.order_id))]
    pub async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<CreatePaymentIntentResponse, ServiceError> {
        let currency = normalize_currency(
            request
                .currency
                .as_deref()
                .unwrap_or(&self.default_currency),
        )?;
        let subtotal = cart_subtotal(&request.items)?;
        let user_id = request
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let coupon_code = request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let quote = match coupon_code {
            Some(code) => Some(self.coupons.evaluate(code, subtotal, user_id).await?),
            None => None,
        };
        let charged = quote.as_ref().map_or(subtotal, |q| q.final_total);

        let amount_minor = to_minor_units(charged)?;
        if amount_minor < self.min_charge_minor {
            warn!(amount_minor, "charge below gateway minimum");
            return Err(ServiceError::amount_too_low(
                amount_minor,
                self.min_charge_minor,
            ));
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            METADATA_USER_ID.to_string(),
            user_id.unwrap_or(GUEST_USER).to_string(),
        );
        if let Some(order_id) = request.order_id {
            metadata.insert(METADATA_ORDER_ID.to_string(), order_id.to_string());
        }
        if let Some(quote) = &quote {
            metadata.insert(METADATA_COUPON_CODE.to_string(), quote.code.clone());
        }

        let intent = self
            .gateway
            .create_intent(CreateIntentRequest {
                amount_minor,
                currency,
                metadata,
            })
            .await?;

        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            ServiceError::ExternalServiceError(format!(
                "payment intent {} has no client secret",
                intent.id
            ))
        })?;

        info!(payment_intent_id = %intent.id, amount_minor, "payment intent created");
        Ok(CreatePaymentIntentResponse {
            client_secret,
            payment_intent_id: intent.id,
            usd_subtotal: quote.as_ref().map(|_| subtotal),
            amount_in_cents: quote.as_ref().map(|_| amount_minor),
        })
    }

    /// Retrieves an intent and requires it to have succeeded
    #[instrument(skip(self))]
    pub async fn retrieve_confirmed(&self, intent_id: &str) -> Result<PaymentIntent, ServiceError> {
        let intent = self.gateway.retrieve_intent(intent_id).await?;
        if !intent.is_succeeded() {
            warn!(status = %intent.status, "payment intent not succeeded");
            return Err(ServiceError::PaymentNotConfirmed {
                intent_id: intent.id,
                status: intent.status.to_string(),
            });
        }
        Ok(intent)
    }
}
