//! Storefront API Library
//!
//! Checkout backend for the storefront: coupon evaluation, Stripe payment
//! intents and order reconciliation through save-order and the signed webhook.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};

use crate::config::AppConfig;
use crate::repositories::{
    CouponRepository, InMemoryCouponRepository, InMemoryOrderRepository, OrderRepository,
    SeaOrmCouponRepository, SeaOrmOrderRepository,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: handlers::AppServices,
    /// Present only with the database store; `/status` pings it
    pub db: Option<Arc<DatabaseConnection>>,
}

/// Coupon and order stores selected by `store_backend`
#[derive(Clone)]
pub struct Stores {
    pub coupons: Arc<dyn CouponRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub db: Option<Arc<DatabaseConnection>>,
}

impl Stores {
    /// Process-local stores; nothing survives a restart
    pub fn in_memory() -> Self {
        Self {
            coupons: Arc::new(InMemoryCouponRepository::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
            db: None,
        }
    }

    pub fn database(db: Arc<DatabaseConnection>) -> Self {
        Self {
            coupons: Arc::new(SeaOrmCouponRepository::new(db.clone())),
            orders: Arc::new(SeaOrmOrderRepository::new(db.clone())),
            db: Some(db),
        }
    }

    /// Connects (and migrates when `auto_migrate` is set) unless the
    /// in-memory backend is configured.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, sea_orm::DbErr> {
        if cfg.uses_in_memory_store() {
            ::tracing::warn!("Using the in-memory store; orders and coupons are not persisted");
            return Ok(Self::in_memory());
        }

        let pool = db::establish_connection_from_app_config(cfg).await?;
        if cfg.auto_migrate {
            db::run_migrations(&pool).await.map_err(|e| {
                ::tracing::error!("Failed running migrations: {}", e);
                e
            })?;
        }
        Ok(Self::database(Arc::new(pool)))
    }
}

// Versioned API routes
pub fn api_v1_routes(state: AppState) -> Router<AppState> {
    let payments = Router::new()
        .route(
            "/payment/create-payment-intent",
            post(handlers::payments::create_payment_intent),
        )
        .route(
            "/payment/apply-coupon",
            post(handlers::payments::apply_coupon),
        )
        .route("/payment/save-order", post(handlers::payments::save_order))
        .route(
            "/payment/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        );

    let storefront = Router::new()
        .route(
            "/coupons/active",
            get(handlers::coupons::list_active_coupons),
        )
        .route("/orders", post(handlers::orders::create_order));

    let admin = Router::new()
        .route(
            "/admin/coupons",
            get(handlers::coupons::list_coupons).post(handlers::coupons::create_coupon),
        )
        .route(
            "/admin/coupons/:id",
            delete(handlers::coupons::delete_coupon),
        )
        .route("/admin/orders", get(handlers::orders::list_orders))
        .route("/admin/orders/:id", get(handlers::orders::get_order))
        .route(
            "/admin/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware_helpers::require_admin_key,
        ));

    Router::new().merge(payments).merge(storefront).merge(admin)
}

/// Builds the CORS layer from config. `None` means no origins are configured
/// and permissive CORS is not allowed either.
pub fn cors_layer(cfg: &AppConfig) -> Option<CorsLayer> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_credentials(cfg.cors_allow_credentials),
        )
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Some(CorsLayer::permissive())
    } else {
        None
    }
}

/// Full application router: probes, OpenAPI document and the v1 API
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config).unwrap_or_else(|| {
        ::tracing::error!("Missing CORS configuration detected; cross-origin requests will be refused");
        CorsLayer::new()
    });
    let body_limit = state.config.max_body_size;

    Router::new()
        .route("/", get(|| async { "storefront-api up" }))
        .route("/health", get(handlers::health::health_check))
        .route("/status", get(handlers::health::status))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes(state.clone()))
        .layer(DefaultBodyLimit::max(body_limit))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
