use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Global cap used when a coupon was created without one (0 = unlimited)
pub const DEFAULT_USAGE_LIMIT: i32 = 0;
/// Per-customer cap used when a coupon was created without one
pub const DEFAULT_PER_USER_LIMIT: i32 = 1;

/// Discount coupon redeemable at checkout
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "coupons")]
#[serde(rename_all = "camelCase")]
#[schema(as = Coupon)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Stored trimmed and uppercased
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub discount_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    #[serde(with = "rust_decimal::serde::float_option", default)]
    #[schema(value_type = Option<f64>)]
    pub min_purchase: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    #[serde(with = "rust_decimal::serde::float_option", default)]
    #[schema(value_type = Option<f64>)]
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: i32,
    pub per_user_limit: i32,
    pub usage_count: i32,
    pub expiration_date: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when the coupon may not be redeemed at `now`
    pub fn is_expired_or_inactive(&self, now: DateTime<Utc>) -> bool {
        !self.active || now >= self.expiration_date
    }

    /// True when the global cap leaves room for another redemption
    pub fn has_remaining_uses(&self) -> bool {
        self.usage_limit <= 0 || self.usage_count < self.usage_limit
    }
}

/// How `discount_value` is interpreted
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiscountType {
    /// Percent of the subtotal, 0 to 100
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// Flat amount in major currency units
    #[sea_orm(string_value = "fixed")]
    Fixed,
}
