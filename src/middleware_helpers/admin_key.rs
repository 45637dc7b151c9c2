use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

/// Header carrying the operator API key
pub const ADMIN_KEY_HEADER: &str = "x-api-key";

/// Gates operator routes behind the configured admin key.
/// With no key configured every operator request is refused.
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let Some(expected) = state
        .config
        .admin_api_key
        .as_deref()
        .filter(|key| !key.is_empty())
    else {
        warn!("Operator route called but no admin API key is configured");
        return Err(ServiceError::Unauthorized(
            "operator access is disabled".to_string(),
        ));
    };

    let presented = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !constant_time_eq(presented, expected) {
        warn!(path = %request.uri().path(), "Rejected operator request with invalid API key");
        return Err(ServiceError::Unauthorized("invalid API key".to_string()));
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
