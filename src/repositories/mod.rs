//! Record stores for coupons and orders.
//!
//! Services depend on the [`CouponRepository`] and [`OrderRepository`]
//! traits; the binary picks the sea-orm backed implementation or the
//! in-memory one from `store_backend`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{DbErr, SqlErr};
use uuid::Uuid;

use crate::entities::coupon::{DiscountType, Model as CouponModel};
use crate::entities::order::{
    Model as OrderModel, OrderItems, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::errors::ServiceError;

pub mod coupon_repository;
pub mod in_memory;
pub mod order_repository;

pub use coupon_repository::SeaOrmCouponRepository;
pub use in_memory::{InMemoryCouponRepository, InMemoryOrderRepository};
pub use order_repository::SeaOrmOrderRepository;

/// Coupon to insert. `None` fields fall back to the column defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub expiration_date: DateTime<Utc>,
    pub active: Option<bool>,
}

/// Order to insert. `None` fields fall back to the column defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub contact_no: String,
    pub address: String,
    pub apartment_no: Option<String>,
    pub city: String,
    pub items: OrderItems,
    pub total_amount: Decimal,
    pub delivery_charge: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub coupon_code: Option<String>,
    pub discount: Option<Decimal>,
    pub payment_intent_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub status: Option<OrderStatus>,
}

/// Partial order update; only populated fields are written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub payment_status: Option<PaymentStatus>,
    pub status: Option<OrderStatus>,
    /// When set, `status` is only written while the stored status still equals it
    pub status_from: Option<OrderStatus>,
    pub payment_intent_id: Option<String>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.payment_status.is_none() && self.status.is_none() && self.payment_intent_id.is_none()
    }

    /// Applies the populated fields to an in-memory record
    pub fn apply_to(&self, order: &mut OrderModel) {
        if let Some(payment_status) = self.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(status) = self.status {
            if self.status_from.map_or(true, |from| order.status == from) {
                order.status = status;
            }
        }
        if let Some(intent_id) = &self.payment_intent_id {
            order.payment_intent_id = Some(intent_id.clone());
        }
    }
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Looks up a coupon by its already-normalized code
    async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError>;

    /// Inserts a coupon; a duplicate code yields `ServiceError::Conflict`
    async fn insert(&self, coupon: NewCoupon) -> Result<CouponModel, ServiceError>;

    /// All coupons, newest first
    async fn list(&self) -> Result<Vec<CouponModel>, ServiceError>;

    /// Active coupons whose expiration is at or after `now`, newest first
    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<CouponModel>, ServiceError>;

    /// Returns false when no coupon has this id
    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError>;

    /// Atomically consumes one redemption of a usable coupon.
    ///
    /// Returns false when the code is unknown, inactive, expired or its
    /// global cap is exhausted.
    async fn try_claim(&self, code: &str, now: DateTime<Utc>) -> Result<bool, ServiceError>;

    /// Gives back a redemption taken by [`CouponRepository::try_claim`]
    async fn release_claim(&self, code: &str) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts an order; a reused payment intent id yields `ServiceError::Conflict`
    async fn insert(&self, order: NewOrder) -> Result<OrderModel, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError>;

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError>;

    /// All orders, newest first
    async fn list(&self) -> Result<Vec<OrderModel>, ServiceError>;

    /// Number of orders that redeemed `coupon_code`
    async fn count_by_coupon(&self, coupon_code: &str) -> Result<u64, ServiceError>;

    /// Number of orders placed by `user_id` that redeemed `coupon_code`
    async fn count_by_coupon_and_user(
        &self,
        coupon_code: &str,
        user_id: &str,
    ) -> Result<u64, ServiceError>;

    /// Writes the populated patch fields in one statement, honoring
    /// `status_from`; `None` when the order does not exist
    async fn update(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<Option<OrderModel>, ServiceError>;

    /// Sets `payment_status = failed` unless the order is already paid.
    /// Returns true when a row changed.
    async fn mark_payment_failed(&self, id: Uuid) -> Result<bool, ServiceError>;
}

/// Maps unique-index violations to `Conflict`, everything else to a database error
pub(crate) fn map_write_error(err: DbErr, conflict_message: impl FnOnce() -> String) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(conflict_message()),
        _ => ServiceError::DatabaseError(err),
    }
}
