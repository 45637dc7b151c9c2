pub mod common;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::gateway::webhook::WebhookVerifier;
use crate::gateway::PaymentGateway;
use crate::repositories::{CouponRepository, OrderRepository};
use crate::services::{coupons::CouponService, orders::OrderService, payments::PaymentService};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub coupons: CouponService,
    pub payments: PaymentService,
    pub orders: OrderService,
    /// Absent when no webhook signing secret is configured
    pub webhook_verifier: Option<Arc<WebhookVerifier>>,
}

impl AppServices {
    /// Wires the checkout services over the given stores and gateway
    pub fn new(
        config: &AppConfig,
        coupon_store: Arc<dyn CouponRepository>,
        order_store: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let coupons = CouponService::new(coupon_store, order_store.clone());
        let payments = PaymentService::new(
            gateway,
            coupons.clone(),
            config.min_charge_minor,
            config.default_currency.clone(),
        );
        let orders = OrderService::new(order_store, coupons.clone(), payments.clone());
        let webhook_verifier = config
            .stripe_webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| {
                Arc::new(WebhookVerifier::new(
                    secret,
                    config.stripe_webhook_tolerance_secs,
                ))
            });

        Self {
            coupons,
            payments,
            orders,
            webhook_verifier,
        }
    }
}
