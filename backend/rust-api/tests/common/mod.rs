#![allow(dead_code)]

use adventurecode_api::{
    config::Config,
    create_router,
    middlewares::auth::JwtClaims,
    services::{
        code_execution::{runtime_for, CodeExecutor, ExecutionError, ExecutionOutput},
        AppState,
    },
    store::InMemoryStore,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Executes nothing: the submitted code is returned as program output, so
/// tests control verdicts by what they submit.
pub struct EchoExecutor;

#[async_trait]
impl CodeExecutor for EchoExecutor {
    async fn execute(&self, code: &str, language: &str) -> Result<ExecutionOutput, ExecutionError> {
        runtime_for(language)?;
        if code == "crash" {
            return Err(ExecutionError::Rejected {
                status: 502,
                body: "upstream exploded".to_string(),
            });
        }
        Ok(ExecutionOutput {
            output: code.to_string(),
            stdout: code.to_string(),
            stderr: String::new(),
        })
    }
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://unused".to_string(),
        mongo_database: "adventurecode_test".to_string(),
        redis_uri: None,
        jwt_secret: TEST_SECRET.to_string(),
        piston_url: "http://piston.invalid/execute".to_string(),
        execution_timeout_secs: 5,
        submissions_per_minute: 30,
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

pub fn create_test_app() -> Router {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let state = AppState::from_parts(
        test_config(),
        Arc::new(InMemoryStore::new()),
        Arc::new(EchoExecutor),
        None,
    );
    create_router(Arc::new(state))
}

pub fn token_for(user_id: &str, username: &str, role: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        username: username.to_string(),
        role: role.to_string(),
        exp: (now + 3600) as usize,
        iat: now as usize,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token")
}

/// Sends a request and returns the status with the parsed JSON body
/// (`Value::Null` for empty bodies).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

pub fn node(id: &str, expected_output: &str) -> Value {
    json!({
        "id": id,
        "position": { "x": 0.0, "y": 0.0 },
        "data": {
            "title": format!("Node {}", id),
            "description": "Print the expected output",
            "expected_output": expected_output,
            "language": "python"
        }
    })
}

pub fn edge(source: &str, target: &str) -> Value {
    json!({
        "id": format!("{}-{}", source, target),
        "source": source,
        "target": target
    })
}

/// A three node chain a -> b -> c expecting "1", "2" and "3".
pub fn chain_graph() -> Value {
    json!({
        "nodes": [node("a", "1"), node("b", "2"), node("c", "3")],
        "edges": [edge("a", "b"), edge("b", "c")]
    })
}

pub async fn create_adventure(app: &Router, token: &str, request_public: bool) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/adventures",
        Some(token),
        Some(json!({
            "name": "Loops and lists",
            "description": "Three short exercises",
            "graph": chain_graph(),
            "request_public": request_public
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    body
}
