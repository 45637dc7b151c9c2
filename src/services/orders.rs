use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{
    Model as OrderModel, OrderItem, OrderItems, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::errors::ServiceError;
use crate::gateway::webhook::PaymentEvent;
use crate::gateway::{PaymentIntent, METADATA_ORDER_ID};
use crate::repositories::{NewOrder, OrderPatch, OrderRepository};
use crate::services::coupons::{normalize_code, CouponService, PaidRedemption};
use crate::services::payments::{to_minor_units, PaymentService};

/// Customer and cart details shared by both order creation paths.
///
/// Every field is optional on the wire so missing ones can be reported
/// together instead of failing on the first.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contact_no: Option<String>,
    pub address: Option<String>,
    pub apartment_no: Option<String>,
    pub city: Option<String>,
    pub items: Option<Vec<OrderItem>>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub total_amount: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub delivery_charge: Option<Decimal>,
}

/// Order body for `save-order`, sent after the client confirmed payment
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveOrderRequest {
    #[serde(flatten)]
    pub details: OrderDetails,
    pub payment_intent_id: Option<String>,
    pub coupon_code: Option<String>,
}

/// Pay-on-delivery or pay-later order
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(flatten)]
    pub details: OrderDetails,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

/// What a webhook delivery did to the order store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Updated,
    Unchanged,
    NoMatchingOrder,
    Ignored,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

struct ValidDetails {
    user_id: Option<String>,
    first_name: String,
    last_name: String,
    contact_no: String,
    address: String,
    apartment_no: Option<String>,
    city: String,
    items: Vec<OrderItem>,
    total_amount: Decimal,
    delivery_charge: Option<Decimal>,
}

impl ValidDetails {
    fn items_subtotal(&self) -> Decimal {
        self.items
            .iter()
            .map(|i| i.price * Decimal::from(i.quantity))
            .sum()
    }
}

/// Required-field check; `missing` carries fields the enclosing request already lacks
fn validate_details(
    details: &OrderDetails,
    mut missing: Vec<String>,
    require_delivery_charge: bool,
) -> Result<ValidDetails, ServiceError> {
    let first_name = present(&details.first_name);
    let last_name = present(&details.last_name);
    let contact_no = present(&details.contact_no);
    let address = present(&details.address);
    let city = present(&details.city);
    let items = details.items.clone().filter(|items| !items.is_empty());

    let mut required: Vec<(&str, bool)> = vec![
        ("firstName", first_name.is_some()),
        ("lastName", last_name.is_some()),
        ("contactNo", contact_no.is_some()),
        ("address", address.is_some()),
        ("city", city.is_some()),
        ("items", items.is_some()),
        ("totalAmount", details.total_amount.is_some()),
    ];
    if require_delivery_charge {
        required.push(("deliveryCharge", details.delivery_charge.is_some()));
    }
    let mut names: Vec<String> = required
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name.to_string())
        .collect();
    names.append(&mut missing);

    match (first_name, last_name, contact_no, address, city, items, details.total_amount) {
        (Some(first_name), Some(last_name), Some(contact_no), Some(address), Some(city), Some(items), Some(total_amount))
            if names.is_empty() =>
        {
            if items.iter().any(|i| i.quantity == 0 || i.price < Decimal::ZERO) {
                return Err(ServiceError::ValidationError(
                    "items need a quantity above 0 and a non-negative price".to_string(),
                ));
            }
            if total_amount < Decimal::ZERO
                || matches!(details.delivery_charge, Some(c) if c < Decimal::ZERO)
            {
                return Err(ServiceError::ValidationError(
                    "amounts must not be negative".to_string(),
                ));
            }
            Ok(ValidDetails {
                user_id: present(&details.user_id),
                first_name,
                last_name,
                contact_no,
                address,
                apartment_no: present(&details.apartment_no),
                city,
                items,
                total_amount,
                delivery_charge: details.delivery_charge,
            })
        }
        _ => Err(ServiceError::MissingFields(names)),
    }
}

/// Fields a confirmed payment still has to write on `order`
fn confirmation_patch(order: &OrderModel, intent_id: &str) -> OrderPatch {
    OrderPatch {
        payment_status: (order.payment_status != PaymentStatus::Paid).then_some(PaymentStatus::Paid),
        // operator progress (Shipped, Delivered, Cancelled) is never rolled back,
        // including an operator update that lands after `order` was read
        status: (order.status == OrderStatus::Pending).then_some(OrderStatus::Processing),
        status_from: Some(OrderStatus::Pending),
        payment_intent_id: (order.payment_intent_id.as_deref() != Some(intent_id))
            .then(|| intent_id.to_string()),
    }
}

/// Order persistence and payment reconciliation
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    coupons: CouponService,
    payments: PaymentService,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        coupons: CouponService,
        payments: PaymentService,
    ) -> Self {
        Self {
            orders,
            coupons,
            payments,
        }
    }

    async fn confirm(&self, order: OrderModel, intent_id: &str) -> Result<(OrderModel, bool), ServiceError> {
        let patch = confirmation_patch(&order, intent_id);
        if patch.is_empty() {
            return Ok((order, false));
        }
        let id = order.id;
        let updated = self
            .orders
            .update(id, patch)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
        Ok((updated, true))
    }

    /// Persists an order once the gateway confirms its payment intent.
    ///
    /// Returns the order and whether it was newly created; a second save for
    /// the same intent returns the existing order.
    #[instrument(skip(self, request), fields(payment_intent_id = ?request.payment_intent_id))]
    pub async fn save_order(
        &self,
        request: SaveOrderRequest,
    ) -> Result<(OrderModel, bool), ServiceError> {
        let intent_id = present(&request.payment_intent_id);
        let missing = if intent_id.is_none() {
            vec!["paymentIntentId".to_string()]
        } else {
            Vec::new()
        };
        let details = validate_details(&request.details, missing, false)?;
        let intent_id = intent_id.ok_or_else(|| {
            ServiceError::MissingFields(vec!["paymentIntentId".to_string()])
        })?;

        let intent = self.payments.retrieve_confirmed(&intent_id).await?;
        let expected_minor = to_minor_units(details.total_amount)?;
        if intent.amount != expected_minor {
            warn!(
                charged = intent.amount,
                expected = expected_minor,
                "intent amount does not match order total"
            );
            return Err(ServiceError::PaymentAmountMismatch {
                charged_minor: intent.amount,
                expected_minor,
            });
        }

        // covers a repeated save and an order placed before payment (orderId metadata)
        if let Some(existing) = self.locate(&intent).await? {
            info!(order_id = %existing.id, "order already recorded for intent");
            let (order, _) = self.confirm(existing, &intent.id).await?;
            return Ok((order, false));
        }

        let coupon_code = present(&request.coupon_code).map(|c| normalize_code(&c));
        let redemption = match &coupon_code {
            Some(code) => Some(
                self.coupons
                    .redeem_for_paid_order(
                        code,
                        details.items_subtotal(),
                        details.user_id.as_deref(),
                    )
                    .await?,
            ),
            None => None,
        };

        let new_order = NewOrder {
            user_id: details.user_id,
            first_name: details.first_name,
            last_name: details.last_name,
            contact_no: details.contact_no,
            address: details.address,
            apartment_no: details.apartment_no,
            city: details.city,
            items: OrderItems(details.items),
            total_amount: details.total_amount,
            delivery_charge: details.delivery_charge,
            payment_method: Some(PaymentMethod::Online),
            coupon_code: coupon_code.clone(),
            discount: redemption.map(|r| r.discount),
            payment_intent_id: Some(intent.id.clone()),
            payment_status: Some(PaymentStatus::Paid),
            status: Some(OrderStatus::Processing),
        };

        match self.orders.insert(new_order).await {
            Ok(order) => {
                info!(order_id = %order.id, "order saved");
                Ok((order, true))
            }
            Err(err) => {
                if let (Some(code), Some(PaidRedemption { claimed: true, .. })) =
                    (&coupon_code, redemption)
                {
                    self.coupons.release(code).await?;
                }
                match err {
                    // a concurrent save for the same intent won the insert
                    ServiceError::Conflict(_) => {
                        let existing = self.locate(&intent).await?.ok_or(err)?;
                        let (order, _) = self.confirm(existing, &intent.id).await?;
                        Ok((order, false))
                    }
                    other => Err(other),
                }
            }
        }
    }

    async fn locate(&self, intent: &PaymentIntent) -> Result<Option<OrderModel>, ServiceError> {
        if let Some(order_id) = intent
            .metadata_value(METADATA_ORDER_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
        {
            if let Some(order) = self.orders.find_by_id(order_id).await? {
                return Ok(Some(order));
            }
        }
        self.orders.find_by_payment_intent(&intent.id).await
    }

    /// Applies a verified webhook outcome to the matching order
    #[instrument(skip(self, event))]
    pub async fn reconcile(&self, event: PaymentEvent) -> Result<ReconcileOutcome, ServiceError> {
        match event {
            PaymentEvent::Succeeded(intent) => {
                let Some(order) = self.locate(&intent).await? else {
                    info!(payment_intent_id = %intent.id, "no order for succeeded intent");
                    return Ok(ReconcileOutcome::NoMatchingOrder);
                };
                match self.confirm(order, &intent.id).await {
                    Ok((order, true)) => {
                        info!(order_id = %order.id, payment_intent_id = %intent.id, "order marked paid");
                        Ok(ReconcileOutcome::Updated)
                    }
                    Ok((_, false)) => Ok(ReconcileOutcome::Unchanged),
                    Err(ServiceError::Conflict(message)) => {
                        warn!(payment_intent_id = %intent.id, "{}", message);
                        Ok(ReconcileOutcome::Unchanged)
                    }
                    Err(err) => Err(err),
                }
            }
            PaymentEvent::Failed(intent) => {
                let Some(order) = self.locate(&intent).await? else {
                    info!(payment_intent_id = %intent.id, "no order for failed intent");
                    return Ok(ReconcileOutcome::NoMatchingOrder);
                };
                if self.orders.mark_payment_failed(order.id).await? {
                    info!(order_id = %order.id, payment_intent_id = %intent.id, "order payment failed");
                    Ok(ReconcileOutcome::Updated)
                } else {
                    Ok(ReconcileOutcome::Unchanged)
                }
            }
            PaymentEvent::Ignored(event_type) => {
                info!(%event_type, "unhandled webhook event type");
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }

    /// Creates an unpaid order for cash-on-delivery or later online payment
    #[instrument(skip(self, request))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderModel, ServiceError> {
        let missing = if request.payment_method.is_none() {
            vec!["paymentMethod".to_string()]
        } else {
            Vec::new()
        };
        let details = validate_details(&request.details, missing, true)?;

        let order = self
            .orders
            .insert(NewOrder {
                user_id: details.user_id,
                first_name: details.first_name,
                last_name: details.last_name,
                contact_no: details.contact_no,
                address: details.address,
                apartment_no: details.apartment_no,
                city: details.city,
                items: OrderItems(details.items),
                total_amount: details.total_amount,
                delivery_charge: details.delivery_charge,
                payment_method: request.payment_method,
                coupon_code: None,
                discount: None,
                payment_intent_id: None,
                payment_status: Some(PaymentStatus::Unpaid),
                status: Some(OrderStatus::Pending),
            })
            .await?;

        info!(order_id = %order.id, payment_method = %order.payment_method, "order placed");
        Ok(order)
    }

    pub async fn list_orders(&self) -> Result<Vec<OrderModel>, ServiceError> {
        self.orders.list().await
    }

    pub async fn get_order(&self, id: Uuid) -> Result<OrderModel, ServiceError> {
        self.orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Operator status change; payment fields are left alone
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: &str) -> Result<OrderModel, ServiceError> {
        let status = OrderStatus::from_str(status.trim())
            .map_err(|_| ServiceError::ValidationError("Invalid status".to_string()))?;

        let order = self
            .orders
            .update(
                id,
                OrderPatch {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        info!(order_id = %order.id, %status, "order status updated");
        Ok(order)
    }
}
