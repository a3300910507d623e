use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::metrics::track_cache_operation;
use crate::services::AppState;

const SUBMISSION_WINDOW_SECONDS: u64 = 60;

/// Fixed-window counter: the first hit creates the key with a TTL, later
/// hits increment it until the limit is reached.
const RATE_LIMIT_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // comma separated list; the first hop is the client
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            for part in s.split(';') {
                if let Some(val) = part.trim().strip_prefix("for=") {
                    return val.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Limits code submissions per authenticated user and per client IP.
/// Disabled when no Redis connection is configured.
pub async fn submission_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(redis) = &state.redis else {
        return Ok(next.run(request).await);
    };

    let limit = state.config.submissions_per_minute;
    if limit == 0 {
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    let user_id = request
        .extensions()
        .get::<super::auth::JwtClaims>()
        .map(|claims| claims.sub.clone());

    let mut keys = vec![format!("ratelimit:submissions:ip:{}", client_ip)];
    if let Some(uid) = &user_id {
        keys.push(format!("ratelimit:submissions:user:{}", uid));
    }

    for key in keys {
        let allowed = check_rate_limit(redis, &key, limit, SUBMISSION_WINDOW_SECONDS)
            .await
            .map_err(|e| {
                tracing::error!("Rate limit check failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        if !allowed {
            tracing::warn!("Submission rate limit exceeded for {}", key);
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    Ok(next.run(request).await)
}

async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> Result<bool, redis::RedisError> {
    let mut conn = redis.clone();

    let allowed: u32 = track_cache_operation("rate_limit", async {
        redis::Script::new(RATE_LIMIT_SCRIPT)
            .key(key)
            .arg(limit)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await
    })
    .await?;

    Ok(allowed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_client_ip_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "1.2.3.4");
    }

    #[test]
    fn test_extract_client_ip_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("forwarded", "for=5.6.7.8;proto=http".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "5.6.7.8");
    }

    #[test]
    fn test_extract_client_ip_connectinfo() {
        let headers = HeaderMap::new();
        let mut exts = axum::http::Extensions::new();
        exts.insert(ConnectInfo::<SocketAddr>("7.7.7.7:1234".parse().unwrap()));
        assert_eq!(extract_client_ip_from(&headers, &exts), "7.7.7.7");
    }

    #[test]
    fn unknown_client_without_hints() {
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&HeaderMap::new(), &exts), "unknown");
    }
}
