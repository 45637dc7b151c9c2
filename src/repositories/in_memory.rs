//! Process-local stores used for development and integration tests.
//!
//! Each store serializes access through a single async lock, so the
//! conditional updates behave atomically just like their SQL versions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entities::coupon::{Model as CouponModel, DEFAULT_PER_USER_LIMIT, DEFAULT_USAGE_LIMIT};
use crate::entities::order::{Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;

use super::{CouponRepository, NewCoupon, NewOrder, OrderPatch, OrderRepository};

fn newest_first<T: Clone>(records: &[T], created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    // Reverse first so that ties keep the most recently inserted record on top
    let mut sorted: Vec<T> = records.iter().rev().cloned().collect();
    sorted.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    sorted
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCouponRepository {
    coupons: Arc<RwLock<Vec<CouponModel>>>,
}

impl InMemoryCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        let coupons = self.coupons.read().await;
        Ok(coupons.iter().find(|c| c.code == code).cloned())
    }

    async fn insert(&self, coupon: NewCoupon) -> Result<CouponModel, ServiceError> {
        let mut coupons = self.coupons.write().await;
        if coupons.iter().any(|c| c.code == coupon.code) {
            return Err(ServiceError::Conflict("Coupon code already exists.".to_string()));
        }

        let now = Utc::now();
        let model = CouponModel {
            id: Uuid::new_v4(),
            code: coupon.code,
            discount_type: coupon.discount_type,
            discount_value: coupon.discount_value,
            min_purchase: coupon.min_purchase,
            max_discount_amount: coupon.max_discount_amount,
            usage_limit: coupon.usage_limit.unwrap_or(DEFAULT_USAGE_LIMIT),
            per_user_limit: coupon.per_user_limit.unwrap_or(DEFAULT_PER_USER_LIMIT),
            usage_count: 0,
            expiration_date: coupon.expiration_date,
            active: coupon.active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        coupons.push(model.clone());
        Ok(model)
    }

    async fn list(&self) -> Result<Vec<CouponModel>, ServiceError> {
        let coupons = self.coupons.read().await;
        Ok(newest_first(&coupons, |c| c.created_at))
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<CouponModel>, ServiceError> {
        let coupons = self.coupons.read().await;
        let active: Vec<CouponModel> = coupons
            .iter()
            .filter(|c| c.active && c.expiration_date >= now)
            .cloned()
            .collect();
        Ok(newest_first(&active, |c| c.created_at))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let mut coupons = self.coupons.write().await;
        let before = coupons.len();
        coupons.retain(|c| c.id != id);
        Ok(coupons.len() != before)
    }

    async fn try_claim(&self, code: &str, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let mut coupons = self.coupons.write().await;
        match coupons.iter_mut().find(|c| c.code == code) {
            Some(coupon) if !coupon.is_expired_or_inactive(now) && coupon.has_remaining_uses() => {
                coupon.usage_count += 1;
                coupon.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_claim(&self, code: &str) -> Result<(), ServiceError> {
        let mut coupons = self.coupons.write().await;
        if let Some(coupon) = coupons
            .iter_mut()
            .find(|c| c.code == code && c.usage_count > 0)
        {
            coupon.usage_count -= 1;
            coupon.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<Vec<OrderModel>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<OrderModel, ServiceError> {
        let mut orders = self.orders.write().await;
        if let Some(intent) = &order.payment_intent_id {
            if orders
                .iter()
                .any(|o| o.payment_intent_id.as_deref() == Some(intent.as_str()))
            {
                return Err(ServiceError::Conflict(format!(
                    "an order for payment intent {} already exists",
                    intent
                )));
            }
        }

        let now = Utc::now();
        let model = OrderModel {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            first_name: order.first_name,
            last_name: order.last_name,
            contact_no: order.contact_no,
            address: order.address,
            apartment_no: order.apartment_no,
            city: order.city,
            items: order.items,
            total_amount: order.total_amount,
            delivery_charge: order.delivery_charge.unwrap_or(Decimal::ZERO),
            payment_method: order.payment_method.unwrap_or(PaymentMethod::Online),
            coupon_code: order.coupon_code,
            discount: order.discount.unwrap_or(Decimal::ZERO),
            payment_intent_id: order.payment_intent_id,
            payment_status: order.payment_status.unwrap_or(PaymentStatus::Unpaid),
            status: order.status.unwrap_or(OrderStatus::Pending),
            created_at: now,
            updated_at: now,
        };
        orders.push(model.clone());
        Ok(model)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .find(|o| o.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<OrderModel>, ServiceError> {
        let orders = self.orders.read().await;
        Ok(newest_first(&orders, |o| o.created_at))
    }

    async fn count_by_coupon(&self, coupon_code: &str) -> Result<u64, ServiceError> {
        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .filter(|o| o.coupon_code.as_deref() == Some(coupon_code))
            .count() as u64)
    }

    async fn count_by_coupon_and_user(
        &self,
        coupon_code: &str,
        user_id: &str,
    ) -> Result<u64, ServiceError> {
        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .filter(|o| {
                o.coupon_code.as_deref() == Some(coupon_code)
                    && o.user_id.as_deref() == Some(user_id)
            })
            .count() as u64)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let mut orders = self.orders.write().await;

        if let Some(intent) = &patch.payment_intent_id {
            let taken = orders
                .iter()
                .any(|o| o.id != id && o.payment_intent_id.as_deref() == Some(intent.as_str()));
            if taken {
                return Err(ServiceError::Conflict(
                    "payment intent already belongs to another order".to_string(),
                ));
            }
        }

        Ok(orders.iter_mut().find(|o| o.id == id).map(|order| {
            if !patch.is_empty() {
                patch.apply_to(order);
                order.updated_at = Utc::now();
            }
            order.clone()
        }))
    }

    async fn mark_payment_failed(&self, id: Uuid) -> Result<bool, ServiceError> {
        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|o| o.id == id) {
            Some(order) if order.payment_status == PaymentStatus::Unpaid => {
                order.payment_status = PaymentStatus::Failed;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::coupon::DiscountType;

    fn coupon(code: &str, usage_limit: Option<i32>) -> NewCoupon {
        NewCoupon {
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(10),
            min_purchase: None,
            max_discount_amount: None,
            usage_limit,
            per_user_limit: None,
            expiration_date: Utc::now() + chrono::Duration::days(7),
            active: None,
        }
    }

    #[tokio::test]
    async fn insert_fills_defaults_and_rejects_duplicates() {
        let repo = InMemoryCouponRepository::new();
        let created = repo.insert(coupon("WELCOME", None)).await.unwrap();
        assert_eq!(created.usage_limit, 0);
        assert_eq!(created.per_user_limit, 1);
        assert!(created.active);

        let err = repo.insert(coupon("WELCOME", None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_claims_never_exceed_the_cap() {
        let repo = InMemoryCouponRepository::new();
        repo.insert(coupon("LIMITED", Some(3))).await.unwrap();

        let now = Utc::now();
        let attempts = (0..10).map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.try_claim("LIMITED", now).await.unwrap() })
        });
        let mut granted = 0;
        for handle in attempts {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        let stored = repo.find_by_code("LIMITED").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 3);
    }

    #[tokio::test]
    async fn unlimited_coupon_always_claims() {
        let repo = InMemoryCouponRepository::new();
        repo.insert(coupon("FOREVER", Some(0))).await.unwrap();
        for _ in 0..5 {
            assert!(repo.try_claim("FOREVER", Utc::now()).await.unwrap());
        }
    }

    #[tokio::test]
    async fn delete_reports_missing_ids() {
        let repo = InMemoryCouponRepository::new();
        let created = repo.insert(coupon("GONE", None)).await.unwrap();
        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
    }
}
