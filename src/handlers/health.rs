use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::time::Instant;

use crate::AppState;

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// Liveness probe
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Readiness with store details; 503 when the database does not answer
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();

    let (store, store_ok, latency_ms) = match &state.db {
        Some(db) => {
            let result = crate::db::check_connection(db).await;
            let ok = result.is_ok();
            (
                json!({
                    "backend": "database",
                    "status": if ok { "up" } else { "down" },
                    "error": result.err().map(|e| e.to_string()),
                }),
                ok,
                Some(start.elapsed().as_millis() as u64),
            )
        }
        None => (json!({ "backend": "in-memory", "status": "up" }), true, None),
    };

    let code = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": if store_ok { "ready" } else { "not_ready" },
            "version": env!("CARGO_PKG_VERSION"),
            "environment": state.config.environment,
            "uptime_secs": uptime_secs(),
            "checks": {
                "store": store,
                "store_latency_ms": latency_ms,
                "webhook_signing": state.services.webhook_verifier.is_some(),
            },
            "response_time_ms": start.elapsed().as_millis()
        })),
    )
}
