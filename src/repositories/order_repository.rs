use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as Order, Model as OrderModel, PaymentStatus,
};
use crate::errors::ServiceError;

use super::{map_write_error, NewOrder, OrderPatch, OrderRepository};

/// Order store backed by sea-orm
#[derive(Debug, Clone)]
pub struct SeaOrmOrderRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn set_if<T: Into<sea_orm::Value>>(value: Option<T>) -> ActiveValue<T> {
    value.map_or(ActiveValue::NotSet, ActiveValue::Set)
}

#[async_trait]
impl OrderRepository for SeaOrmOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<OrderModel, ServiceError> {
        let now = Utc::now();
        let intent = order.payment_intent_id.clone();
        let model = OrderActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            user_id: ActiveValue::Set(order.user_id),
            first_name: ActiveValue::Set(order.first_name),
            last_name: ActiveValue::Set(order.last_name),
            contact_no: ActiveValue::Set(order.contact_no),
            address: ActiveValue::Set(order.address),
            apartment_no: ActiveValue::Set(order.apartment_no),
            city: ActiveValue::Set(order.city),
            items: ActiveValue::Set(order.items),
            total_amount: ActiveValue::Set(order.total_amount),
            delivery_charge: set_if(order.delivery_charge),
            payment_method: set_if(order.payment_method),
            coupon_code: ActiveValue::Set(order.coupon_code),
            discount: set_if(order.discount),
            payment_intent_id: ActiveValue::Set(order.payment_intent_id),
            payment_status: set_if(order.payment_status),
            status: set_if(order.status),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };

        model.insert(self.db.as_ref()).await.map_err(|e| {
            map_write_error(e, || {
                format!(
                    "an order for payment intent {} already exists",
                    intent.as_deref().unwrap_or("-")
                )
            })
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id).one(self.db.as_ref()).await?)
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find()
            .filter(Column::PaymentIntentId.eq(payment_intent_id))
            .one(self.db.as_ref())
            .await?)
    }

    async fn list(&self) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(Order::find()
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    async fn count_by_coupon(&self, coupon_code: &str) -> Result<u64, ServiceError> {
        Ok(Order::find()
            .filter(Column::CouponCode.eq(coupon_code))
            .count(self.db.as_ref())
            .await?)
    }

    async fn count_by_coupon_and_user(
        &self,
        coupon_code: &str,
        user_id: &str,
    ) -> Result<u64, ServiceError> {
        Ok(Order::find()
            .filter(Column::CouponCode.eq(coupon_code))
            .filter(Column::UserId.eq(user_id))
            .count(self.db.as_ref())
            .await?)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<Option<OrderModel>, ServiceError> {
        if patch.is_empty() {
            return self.find_by_id(id).await;
        }

        let mut query = Order::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id));
        if let Some(payment_status) = patch.payment_status {
            query = query.col_expr(Column::PaymentStatus, Expr::value(payment_status));
        }
        if let Some(status) = patch.status {
            let value: SimpleExpr = match patch.status_from {
                // decided by the row itself, so a concurrent operator update wins
                Some(from) => Expr::case(Column::Status.eq(from), Expr::value(status))
                    .finally(Expr::col(Column::Status))
                    .into(),
                None => Expr::value(status),
            };
            query = query.col_expr(Column::Status, value);
        }
        if let Some(intent_id) = patch.payment_intent_id {
            query = query.col_expr(Column::PaymentIntentId, Expr::value(intent_id));
        }

        let result = query.exec(self.db.as_ref()).await.map_err(|e| {
            map_write_error(e, || {
                "payment intent already belongs to another order".to_string()
            })
        })?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn mark_payment_failed(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Order::update_many()
            .col_expr(Column::PaymentStatus, Expr::value(PaymentStatus::Failed))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .filter(Column::PaymentStatus.ne(PaymentStatus::Paid))
            .filter(Column::PaymentStatus.ne(PaymentStatus::Failed))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::{OrderItem, OrderItems, OrderStatus};
    use crate::repositories::CouponRepository;
    use rust_decimal::Decimal;

    async fn sqlite_store() -> Arc<DatabaseConnection> {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        Arc::new(db)
    }

    fn new_order(intent: Option<&str>) -> NewOrder {
        NewOrder {
            user_id: Some("user-1".into()),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            contact_no: "555-0100".into(),
            address: "1 Analytical Way".into(),
            apartment_no: None,
            city: "London".into(),
            items: OrderItems(vec![OrderItem {
                product_id: "p1".into(),
                size: None,
                color: None,
                quantity: 2,
                price: Decimal::new(2500, 2),
            }]),
            total_amount: Decimal::new(5000, 2),
            delivery_charge: None,
            payment_method: None,
            coupon_code: Some("SAVE10".into()),
            discount: None,
            payment_intent_id: intent.map(str::to_string),
            payment_status: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn insert_applies_column_defaults_and_rejects_reused_intent() {
        let db = sqlite_store().await;
        let repo = SeaOrmOrderRepository::new(db);

        let order = repo.insert(new_order(Some("pi_1"))).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(order.delivery_charge, Decimal::ZERO);

        let err = repo.insert(new_order(Some("pi_1"))).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(repo.count_by_coupon("SAVE10").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_payment_never_overwrites_paid() {
        let db = sqlite_store().await;
        let repo = SeaOrmOrderRepository::new(db);
        let order = repo.insert(new_order(Some("pi_2"))).await.unwrap();

        let patch = OrderPatch {
            payment_status: Some(PaymentStatus::Paid),
            status: Some(OrderStatus::Processing),
            status_from: None,
            payment_intent_id: None,
        };
        repo.update(order.id, patch).await.unwrap();

        assert!(!repo.mark_payment_failed(order.id).await.unwrap());
        let stored = repo.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn update_writes_patch_and_reports_missing_orders() {
        let db = sqlite_store().await;
        let repo = SeaOrmOrderRepository::new(db);
        let order = repo.insert(new_order(None)).await.unwrap();

        let updated = repo
            .update(
                order.id,
                OrderPatch {
                    payment_status: Some(PaymentStatus::Paid),
                    status: Some(OrderStatus::Processing),
                    status_from: Some(OrderStatus::Pending),
                    payment_intent_id: Some("pi_3".into()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Paid);
        assert_eq!(updated.status, OrderStatus::Processing);
        assert_eq!(updated.payment_intent_id.as_deref(), Some("pi_3"));
        assert_eq!(updated.first_name, "Ada");
        assert!(updated.updated_at >= order.updated_at);

        let missing = repo
            .update(
                Uuid::new_v4(),
                OrderPatch {
                    status: Some(OrderStatus::Delivered),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(missing.is_none());

        let other = repo.insert(new_order(None)).await.unwrap();
        let err = repo
            .update(
                other.id,
                OrderPatch {
                    payment_intent_id: Some("pi_3".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn guarded_status_keeps_operator_progress() {
        let db = sqlite_store().await;
        let repo = SeaOrmOrderRepository::new(db);
        let order = repo.insert(new_order(None)).await.unwrap();

        // operator ships the order after the confirmation read it as Pending
        repo.update(
            order.id,
            OrderPatch {
                status: Some(OrderStatus::Shipped),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let confirmed = repo
            .update(
                order.id,
                OrderPatch {
                    payment_status: Some(PaymentStatus::Paid),
                    status: Some(OrderStatus::Processing),
                    status_from: Some(OrderStatus::Pending),
                    payment_intent_id: Some("pi_4".into()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Shipped);
        assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
        assert_eq!(confirmed.payment_intent_id.as_deref(), Some("pi_4"));
    }

    #[tokio::test]
    async fn claim_stops_at_usage_limit() {
        use crate::entities::coupon::DiscountType;
        use crate::repositories::{NewCoupon, SeaOrmCouponRepository};

        let db = sqlite_store().await;
        let coupons = SeaOrmCouponRepository::new(db);
        coupons
            .insert(NewCoupon {
                code: "ONCE".into(),
                discount_type: DiscountType::Fixed,
                discount_value: Decimal::from(5),
                min_purchase: None,
                max_discount_amount: None,
                usage_limit: Some(1),
                per_user_limit: None,
                expiration_date: Utc::now() + chrono::Duration::days(1),
                active: None,
            })
            .await
            .unwrap();

        let now = Utc::now();
        assert!(coupons.try_claim("ONCE", now).await.unwrap());
        assert!(!coupons.try_claim("ONCE", now).await.unwrap());
        coupons.release_claim("ONCE").await.unwrap();
        assert!(coupons.try_claim("ONCE", now).await.unwrap());
    }
}
