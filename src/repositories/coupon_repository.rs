use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::coupon::{
    ActiveModel as CouponActiveModel, Column, Entity as Coupon, Model as CouponModel,
};
use crate::errors::ServiceError;

use super::{map_write_error, CouponRepository, NewCoupon};

/// Coupon store backed by sea-orm
#[derive(Debug, Clone)]
pub struct SeaOrmCouponRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCouponRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn optional<T: Into<sea_orm::Value>>(value: Option<T>) -> ActiveValue<T> {
    match value {
        Some(v) => ActiveValue::Set(v),
        None => ActiveValue::NotSet,
    }
}

#[async_trait]
impl CouponRepository for SeaOrmCouponRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        Ok(Coupon::find()
            .filter(Column::Code.eq(code))
            .one(self.db.as_ref())
            .await?)
    }

    async fn insert(&self, coupon: NewCoupon) -> Result<CouponModel, ServiceError> {
        let now = Utc::now();
        let model = CouponActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            code: ActiveValue::Set(coupon.code),
            discount_type: ActiveValue::Set(coupon.discount_type),
            discount_value: ActiveValue::Set(coupon.discount_value),
            min_purchase: optional(coupon.min_purchase.map(Some)),
            max_discount_amount: optional(coupon.max_discount_amount.map(Some)),
            usage_limit: optional(coupon.usage_limit),
            per_user_limit: optional(coupon.per_user_limit),
            usage_count: ActiveValue::NotSet,
            expiration_date: ActiveValue::Set(coupon.expiration_date),
            active: optional(coupon.active),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| map_write_error(e, || "Coupon code already exists.".to_string()))
    }

    async fn list(&self) -> Result<Vec<CouponModel>, ServiceError> {
        Ok(Coupon::find()
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<CouponModel>, ServiceError> {
        Ok(Coupon::find()
            .filter(Column::Active.eq(true))
            .filter(Column::ExpirationDate.gte(now))
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Coupon::delete_by_id(id).exec(self.db.as_ref()).await?;
        Ok(result.rows_affected > 0)
    }

    async fn try_claim(&self, code: &str, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        // Single conditional UPDATE; concurrent claimers serialize on the row
        let result = Coupon::update_many()
            .col_expr(Column::UsageCount, Expr::col(Column::UsageCount).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Code.eq(code))
            .filter(Column::Active.eq(true))
            .filter(Column::ExpirationDate.gt(now))
            .filter(
                Condition::any()
                    .add(Column::UsageLimit.lte(0))
                    .add(Expr::col(Column::UsageCount).lt(Expr::col(Column::UsageLimit))),
            )
            .exec(self.db.as_ref())
            .await?;

        debug!(code, rows = result.rows_affected, "coupon claim attempted");
        Ok(result.rows_affected > 0)
    }

    async fn release_claim(&self, code: &str) -> Result<(), ServiceError> {
        Coupon::update_many()
            .col_expr(Column::UsageCount, Expr::col(Column::UsageCount).sub(1))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Code.eq(code))
            .filter(Column::UsageCount.gt(0))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
