#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    entities::coupon::{DiscountType, Model as CouponModel},
    errors::ServiceError,
    gateway::{
        webhook::{WebhookVerifier, SIGNATURE_HEADER},
        CreateIntentRequest, IntentStatus, PaymentGateway, PaymentIntent,
    },
    handlers::AppServices,
    middleware_helpers::admin_key::ADMIN_KEY_HEADER,
    services::coupons::CreateCouponRequest,
    AppState, Stores,
};
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ADMIN_KEY: &str = "test-admin-key";

/// Gateway double that keeps intents in memory
#[derive(Default)]
pub struct FakeGateway {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    created: Mutex<Vec<CreateIntentRequest>>,
}

impl FakeGateway {
    /// Registers an intent with the given amount and status
    pub fn put_intent(&self, id: &str, amount: i64, status: IntentStatus) {
        self.put_intent_with_metadata(id, amount, status, HashMap::new());
    }

    pub fn put_intent_with_metadata(
        &self,
        id: &str,
        amount: i64,
        status: IntentStatus,
        metadata: HashMap<String, String>,
    ) {
        let intent = PaymentIntent {
            id: id.to_string(),
            amount,
            currency: "usd".to_string(),
            status,
            client_secret: Some(format!("{}_secret", id)),
            metadata,
        };
        self.intents
            .lock()
            .unwrap()
            .insert(id.to_string(), intent);
    }

    pub fn intent(&self, id: &str) -> Option<PaymentIntent> {
        self.intents.lock().unwrap().get(id).cloned()
    }

    pub fn created_requests(&self) -> Vec<CreateIntentRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let mut created = self.created.lock().unwrap();
        let id = format!("pi_test_{}", created.len() + 1);
        let intent = PaymentIntent {
            id: id.clone(),
            amount: request.amount_minor,
            currency: request.currency.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            client_secret: Some(format!("{}_secret_abc", id)),
            metadata: request.metadata.clone(),
        };
        created.push(request);
        self.intents.lock().unwrap().insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ServiceError> {
        self.intent(intent_id)
            .ok_or_else(|| ServiceError::NotFound(format!("payment intent {}", intent_id)))
    }
}

/// Router over in-memory stores and a fake gateway
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    signer: WebhookVerifier,
}

impl TestApp {
    pub fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "sk_test_123".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.store_backend = "in-memory".to_string();
        cfg.stripe_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        cfg.admin_api_key = Some(ADMIN_KEY.to_string());
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: AppConfig) -> Self {
        let stores = Stores::in_memory();
        let gateway = Arc::new(FakeGateway::default());
        let services = AppServices::new(
            &cfg,
            stores.coupons.clone(),
            stores.orders.clone(),
            gateway.clone(),
        );
        let state = AppState {
            config: cfg.clone(),
            services,
            db: None,
        };
        let signer = WebhookVerifier::new(
            cfg.stripe_webhook_secret.clone().unwrap_or_default(),
            cfg.stripe_webhook_tolerance_secs,
        );

        Self {
            router: storefront_api::build_router(state.clone()),
            state,
            gateway,
            signer,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");
        self.send(request).await
    }

    pub async fn admin_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Response {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header(ADMIN_KEY_HEADER, ADMIN_KEY);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");
        self.send(request).await
    }

    /// Delivers `event` signed with the configured secret
    pub async fn deliver_webhook(&self, event: &Value) -> Response {
        let payload = event.to_string();
        let signature = self
            .signer
            .sign(payload.as_bytes(), Utc::now().timestamp())
            .expect("signing should succeed");
        self.deliver_raw_webhook(payload, Some(signature)).await
    }

    pub async fn deliver_raw_webhook(&self, payload: String, signature: Option<String>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payment/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        self.send(builder.body(Body::from(payload)).expect("valid request"))
            .await
    }

    pub async fn seed_coupon(&self, request: CreateCouponRequest) -> CouponModel {
        self.state
            .services
            .coupons
            .create(request)
            .await
            .expect("coupon should be created")
    }
}

/// A coupon valid for a week with the column defaults otherwise
pub fn coupon_request(code: &str, discount_type: DiscountType, value: Decimal) -> CreateCouponRequest {
    CreateCouponRequest {
        code: code.to_string(),
        discount_type,
        discount_value: value,
        min_purchase: None,
        max_discount_amount: None,
        usage_limit: None,
        per_user_limit: None,
        expiration_date: Utc::now() + Duration::days(7),
        active: None,
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Webhook envelope for a payment intent event
pub fn intent_event(event_type: &str, intent: &PaymentIntent) -> Value {
    serde_json::json!({
        "id": format!("evt_{}", intent.id),
        "type": event_type,
        "data": { "object": intent }
    })
}
