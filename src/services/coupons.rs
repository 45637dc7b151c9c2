use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::coupon::{DiscountType, Model as CouponModel};
use crate::errors::{display_amount, ServiceError};
use crate::repositories::{CouponRepository, NewCoupon, OrderRepository};

/// Reasons a coupon cannot be applied, in evaluation order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponRejection {
    #[error("Invalid coupon code")]
    InvalidCoupon,
    #[error("Coupon is expired or inactive")]
    ExpiredOrInactive,
    #[error("Minimum purchase of {} required to use this coupon", display_amount(.minimum))]
    BelowMinimumPurchase { minimum: Decimal },
    #[error("Coupon usage limit has been reached")]
    GlobalLimitReached,
    #[error("Please log in to use this coupon")]
    LoginRequired,
    #[error("You have already used this coupon the maximum number of times")]
    PerUserLimitReached,
}

impl CouponRejection {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidCoupon => StatusCode::NOT_FOUND,
            Self::LoginRequired => StatusCode::UNAUTHORIZED,
            Self::ExpiredOrInactive
            | Self::BelowMinimumPurchase { .. }
            | Self::GlobalLimitReached
            | Self::PerUserLimitReached => StatusCode::BAD_REQUEST,
        }
    }
}

/// Canonical form of a coupon code: trimmed and uppercased
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Expiration, activity and minimum-purchase checks
pub fn check_eligibility(
    coupon: &CouponModel,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    if coupon.is_expired_or_inactive(now) {
        return Err(CouponRejection::ExpiredOrInactive);
    }
    if let Some(minimum) = coupon.min_purchase {
        if subtotal < minimum {
            return Err(CouponRejection::BelowMinimumPurchase { minimum });
        }
    }
    Ok(())
}

/// Discount for `subtotal`, capped by `max_discount_amount` (percentage
/// coupons only) and never more than the subtotal itself
pub fn compute_discount(coupon: &CouponModel, subtotal: Decimal) -> Decimal {
    let subtotal = subtotal.max(Decimal::ZERO);
    let raw = match coupon.discount_type {
        DiscountType::Percentage => subtotal * (coupon.discount_value / Decimal::ONE_HUNDRED),
        DiscountType::Fixed => coupon.discount_value,
    };

    let capped = match (coupon.discount_type, coupon.max_discount_amount) {
        (DiscountType::Percentage, Some(cap)) => raw.min(cap),
        _ => raw,
    };

    capped.min(subtotal).max(Decimal::ZERO)
}

/// Outcome of applying a coupon to a subtotal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponQuote {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount: Decimal,
    pub final_total: Decimal,
}

impl CouponQuote {
    fn new(coupon: &CouponModel, subtotal: Decimal) -> Self {
        let discount = compute_discount(coupon, subtotal);
        Self {
            code: coupon.code.clone(),
            discount_type: coupon.discount_type,
            discount,
            final_total: subtotal - discount,
        }
    }
}

/// Coupon outcome for an order that is already paid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaidRedemption {
    pub discount: Decimal,
    /// False when the order went over the coupon's limits and holds no claim
    pub claimed: bool,
}

/// Operator request to create a coupon
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub discount_type: DiscountType,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub discount_value: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub min_purchase: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub max_discount_amount: Option<Decimal>,
    #[validate(range(min = 0))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 0))]
    pub per_user_limit: Option<i32>,
    pub expiration_date: DateTime<Utc>,
    pub active: Option<bool>,
}

impl CreateCouponRequest {
    fn check_amounts(&self) -> Result<(), ServiceError> {
        if self.discount_value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "discountValue must be greater than 0".to_string(),
            ));
        }
        if self.discount_type == DiscountType::Percentage
            && self.discount_value > Decimal::ONE_HUNDRED
        {
            return Err(ServiceError::ValidationError(
                "percentage discountValue must be between 0 and 100".to_string(),
            ));
        }
        for (field, value) in [
            ("minPurchase", self.min_purchase),
            ("maxDiscountAmount", self.max_discount_amount),
        ] {
            if matches!(value, Some(v) if v < Decimal::ZERO) {
                return Err(ServiceError::ValidationError(format!(
                    "{} must not be negative",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Coupon evaluation, redemption and administration
#[derive(Clone)]
pub struct CouponService {
    coupons: Arc<dyn CouponRepository>,
    orders: Arc<dyn OrderRepository>,
}

impl CouponService {
    pub fn new(coupons: Arc<dyn CouponRepository>, orders: Arc<dyn OrderRepository>) -> Self {
        Self { coupons, orders }
    }

    async fn find(&self, code: &str) -> Result<CouponModel, ServiceError> {
        self.coupons
            .find_by_code(code)
            .await?
            .ok_or(ServiceError::CouponRejected(CouponRejection::InvalidCoupon))
    }

    async fn check_per_user_limit(
        &self,
        coupon: &CouponModel,
        user_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        if coupon.per_user_limit <= 0 {
            return Ok(());
        }
        let user_id = user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(CouponRejection::LoginRequired)?;
        let used = self
            .orders
            .count_by_coupon_and_user(&coupon.code, user_id)
            .await?;
        if used >= coupon.per_user_limit as u64 {
            return Err(CouponRejection::PerUserLimitReached.into());
        }
        Ok(())
    }

    /// Evaluates `code` against a cart subtotal without consuming it
    #[instrument(skip(self))]
    pub async fn evaluate(
        &self,
        code: &str,
        subtotal: Decimal,
        user_id: Option<&str>,
    ) -> Result<CouponQuote, ServiceError> {
        if subtotal < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "subtotal must not be negative".to_string(),
            ));
        }

        let code = normalize_code(code);
        let coupon = self.find(&code).await?;
        check_eligibility(&coupon, subtotal, Utc::now())?;

        if coupon.usage_limit > 0 {
            let used = self.orders.count_by_coupon(&coupon.code).await?;
            if used >= coupon.usage_limit as u64 {
                return Err(CouponRejection::GlobalLimitReached.into());
            }
        }

        self.check_per_user_limit(&coupon, user_id).await?;

        let quote = CouponQuote::new(&coupon, subtotal);
        debug!(code = %quote.code, discount = %quote.discount, "coupon evaluated");
        Ok(quote)
    }

    /// Re-validates `code` and atomically consumes one redemption.
    ///
    /// Callers that fail to persist the order afterwards must hand the
    /// redemption back with [`CouponService::release`].
    #[instrument(skip(self))]
    pub async fn redeem(
        &self,
        code: &str,
        subtotal: Decimal,
        user_id: Option<&str>,
    ) -> Result<CouponQuote, ServiceError> {
        let code = normalize_code(code);
        let coupon = self.find(&code).await?;
        let now = Utc::now();
        check_eligibility(&coupon, subtotal, now)?;
        self.check_per_user_limit(&coupon, user_id).await?;

        if !self.coupons.try_claim(&coupon.code, now).await? {
            // Lost a race: the coupon changed between the read and the claim
            let rejection = match self.coupons.find_by_code(&coupon.code).await? {
                None => CouponRejection::InvalidCoupon,
                Some(current) if current.is_expired_or_inactive(now) => {
                    CouponRejection::ExpiredOrInactive
                }
                Some(_) => CouponRejection::GlobalLimitReached,
            };
            warn!(code = %coupon.code, ?rejection, "coupon claim refused");
            return Err(rejection.into());
        }

        info!(code = %coupon.code, "coupon redeemed");
        Ok(CouponQuote::new(&coupon, subtotal))
    }

    /// Returns a redemption taken by [`CouponService::redeem`]
    pub async fn release(&self, code: &str) -> Result<(), ServiceError> {
        self.coupons.release_claim(&normalize_code(code)).await
    }

    /// Redeems `code` for an order whose payment already succeeded.
    ///
    /// A rejection never refuses the order: it is logged as an overage and
    /// the discount the coupon would give is still recorded (zero for an
    /// unknown code).
    #[instrument(skip(self))]
    pub async fn redeem_for_paid_order(
        &self,
        code: &str,
        subtotal: Decimal,
        user_id: Option<&str>,
    ) -> Result<PaidRedemption, ServiceError> {
        match self.redeem(code, subtotal, user_id).await {
            Ok(quote) => Ok(PaidRedemption {
                discount: quote.discount,
                claimed: true,
            }),
            Err(ServiceError::CouponRejected(rejection)) => {
                let code = normalize_code(code);
                let discount = self
                    .coupons
                    .find_by_code(&code)
                    .await?
                    .map(|coupon| compute_discount(&coupon, subtotal))
                    .unwrap_or(Decimal::ZERO);
                warn!(%code, ?rejection, %discount, "coupon overage on a paid order");
                Ok(PaidRedemption {
                    discount,
                    claimed: false,
                })
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: CreateCouponRequest) -> Result<CouponModel, ServiceError> {
        request.validate()?;
        request.check_amounts()?;

        let code = normalize_code(&request.code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "code must not be blank".to_string(),
            ));
        }

        let coupon = self
            .coupons
            .insert(NewCoupon {
                code,
                discount_type: request.discount_type,
                discount_value: request.discount_value,
                min_purchase: request.min_purchase,
                max_discount_amount: request.max_discount_amount,
                usage_limit: request.usage_limit,
                per_user_limit: request.per_user_limit,
                expiration_date: request.expiration_date,
                active: request.active,
            })
            .await?;

        info!(coupon_id = %coupon.id, "coupon created");
        Ok(coupon)
    }

    pub async fn list(&self) -> Result<Vec<CouponModel>, ServiceError> {
        self.coupons.list().await
    }

    pub async fn list_active(&self) -> Result<Vec<CouponModel>, ServiceError> {
        self.coupons.list_active(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if self.coupons.delete(id).await? {
            info!("coupon deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound("Coupon not found".to_string()))
        }
    }
}
