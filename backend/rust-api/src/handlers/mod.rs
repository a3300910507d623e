use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::AppState;

pub mod admin;
pub mod adventures;
pub mod attempts;
pub mod problems;
pub mod submissions;

const STORE_PING_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);
const REDIS_PING_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let store_health = check_store(&state).await;
    let mut all_healthy = is_healthy(&store_health);
    dependencies.insert("store".to_string(), json!(store_health));

    // Redis only backs the rate limiter; report it when configured
    if state.redis.is_some() {
        let redis_health = check_redis(&state).await;
        all_healthy &= is_healthy(&redis_health);
        dependencies.insert("redis".to_string(), json!(redis_health));
    }

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "adventurecode-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": dependencies
        })),
    )
}

fn is_healthy(check: &serde_json::Map<String, serde_json::Value>) -> bool {
    check.get("status").and_then(|v| v.as_str()) == Some("healthy")
}

fn health_entry(outcome: Result<(), String>) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();
    match outcome {
        Ok(()) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Err(e) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(e));
        }
    }
    result
}

async fn check_store(state: &AppState) -> serde_json::Map<String, serde_json::Value> {
    let outcome = match tokio::time::timeout(STORE_PING_TIMEOUT, state.store.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("Store error: {}", e)),
        Err(_) => Err(format!("Store timeout after {:?}", STORE_PING_TIMEOUT)),
    };
    health_entry(outcome)
}

async fn check_redis(state: &AppState) -> serde_json::Map<String, serde_json::Value> {
    let Some(redis) = &state.redis else {
        return health_entry(Ok(()));
    };

    let mut conn = redis.clone();
    let outcome = match tokio::time::timeout(
        REDIS_PING_TIMEOUT,
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("Redis error: {}", e)),
        Err(_) => Err(format!("Redis timeout after {:?}", REDIS_PING_TIMEOUT)),
    };
    health_entry(outcome)
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Protects `/metrics` with HTTP Basic auth against `METRICS_AUTH`
/// (`username:password`).
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    if credentials != expected {
        tracing::warn!("Rejected /metrics request with bad credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
