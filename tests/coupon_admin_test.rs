//! Operator coupon and order administration through the HTTP API.

mod common;

use axum::http::{Method, StatusCode};
use common::{coupon_request, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::entities::coupon::DiscountType;

fn coupon_body(code: &str) -> serde_json::Value {
    json!({
        "code": code,
        "discountType": "fixed",
        "discountValue": 5.0,
        "expirationDate": (chrono::Utc::now() + chrono::Duration::days(30)).to_rfc3339()
    })
}

#[tokio::test]
async fn admin_routes_require_api_key() {
    let app = TestApp::new();

    let anonymous = app
        .request(Method::GET, "/api/v1/admin/coupons", None)
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let anonymous_orders = app
        .request(Method::GET, "/api/v1/admin/orders", None)
        .await;
    assert_eq!(anonymous_orders.status(), StatusCode::UNAUTHORIZED);

    let authorized = app
        .admin_request(Method::GET, "/api/v1/admin/coupons", None)
        .await;
    assert_eq!(authorized.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_are_closed_without_configured_key() {
    let mut cfg = storefront_api::config::AppConfig::new(
        "sqlite::memory:".to_string(),
        "sk_test_123".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "development".to_string(),
    );
    cfg.store_backend = "in-memory".to_string();
    let app = TestApp::with_config(cfg);

    let response = app
        .admin_request(Method::GET, "/api/v1/admin/coupons", None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_list_and_delete_coupon() {
    let app = TestApp::new();

    let created = app
        .admin_request(Method::POST, "/api/v1/admin/coupons", Some(coupon_body("welcome5")))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = response_json(created).await;
    assert_eq!(body["message"], json!("Coupon created successfully"));
    assert_eq!(body["coupon"]["code"], json!("WELCOME5"));
    assert_eq!(body["coupon"]["usageLimit"], json!(0));
    assert_eq!(body["coupon"]["perUserLimit"], json!(1));
    assert_eq!(body["coupon"]["usageCount"], json!(0));
    assert_eq!(body["coupon"]["active"], json!(true));
    let id = body["coupon"]["id"].as_str().unwrap().to_string();

    let duplicate = app
        .admin_request(Method::POST, "/api/v1/admin/coupons", Some(coupon_body("WELCOME5")))
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let listed = response_json(
        app.admin_request(Method::GET, "/api/v1/admin/coupons", None)
            .await,
    )
    .await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let deleted = app
        .admin_request(Method::DELETE, &format!("/api/v1/admin/coupons/{}", id), None)
        .await;
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(
        response_json(deleted).await["message"],
        json!("Coupon deleted successfully")
    );

    let again = app
        .admin_request(Method::DELETE, &format!("/api/v1/admin/coupons/{}", id), None)
        .await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_coupon_definitions_are_rejected() {
    let app = TestApp::new();

    let mut too_generous = coupon_body("HUGE");
    too_generous["discountType"] = json!("percentage");
    too_generous["discountValue"] = json!(150.0);
    let response = app
        .admin_request(Method::POST, "/api/v1/admin/coupons", Some(too_generous))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut free = coupon_body("FREE");
    free["discountValue"] = json!(0.0);
    let response = app
        .admin_request(Method::POST, "/api/v1/admin/coupons", Some(free))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn active_listing_hides_expired_and_inactive_coupons() {
    let app = TestApp::new();
    app.seed_coupon(coupon_request("LIVE", DiscountType::Fixed, dec!(5)))
        .await;

    let mut expired = coupon_request("OLD", DiscountType::Fixed, dec!(5));
    expired.expiration_date = chrono::Utc::now() - chrono::Duration::days(1);
    app.seed_coupon(expired).await;

    let mut paused = coupon_request("PAUSED", DiscountType::Fixed, dec!(5));
    paused.active = Some(false);
    app.seed_coupon(paused).await;

    let response = app.request(Method::GET, "/api/v1/coupons/active", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let codes: Vec<String> = response_json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, vec!["LIVE".to_string()]);
}

#[tokio::test]
async fn cash_on_delivery_order_and_status_updates() {
    let app = TestApp::new();

    let created = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "firstName": "Grace",
                "lastName": "Hopper",
                "contactNo": "555-0199",
                "address": "1 Compiler Road",
                "city": "Arlington",
                "items": [{ "productId": "mug", "quantity": 1, "price": 12.5 }],
                "totalAmount": 17.5,
                "deliveryCharge": 5.0,
                "paymentMethod": "COD"
            })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = response_json(created).await;
    assert_eq!(body["message"], json!("Order created successfully"));
    assert_eq!(body["order"]["paymentMethod"], json!("COD"));
    assert_eq!(body["order"]["paymentStatus"], json!("unpaid"));
    assert_eq!(body["order"]["status"], json!("Pending"));
    let id = body["order"]["id"].as_str().unwrap().to_string();

    let missing_charge = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "firstName": "Grace",
                "lastName": "Hopper",
                "contactNo": "555-0199",
                "address": "1 Compiler Road",
                "city": "Arlington",
                "items": [{ "productId": "mug", "quantity": 1, "price": 12.5 }],
                "totalAmount": 12.5
            })),
        )
        .await;
    assert_eq!(missing_charge.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response_json(missing_charge).await["message"],
        json!("Missing required order details: deliveryCharge, paymentMethod")
    );

    let invalid = app
        .admin_request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", id),
            Some(json!({ "status": "Teleported" })),
        )
        .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let delivered = app
        .admin_request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", id),
            Some(json!({ "status": "Delivered" })),
        )
        .await;
    assert_eq!(delivered.status(), StatusCode::OK);
    let body = response_json(delivered).await;
    assert_eq!(body["status"], json!("Delivered"));
    assert_eq!(body["paymentStatus"], json!("unpaid"));

    let unknown = app
        .admin_request(
            Method::GET,
            &format!("/api/v1/admin/orders/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
