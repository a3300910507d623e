use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .nest("/api/v1", api_routes(app_state.clone()))
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn api_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .merge(public_routes(app_state.clone()))
        .merge(protected_routes(app_state.clone()))
        .nest("/admin", admin_routes(app_state))
}

/// Routes reachable without a token.
fn public_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let submit = Router::new()
        .route("/submissions", post(handlers::submissions::submit_solution))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::submission_rate_limit_middleware,
        ));

    Router::new()
        .route(
            "/adventures/public",
            get(handlers::adventures::list_public_adventures),
        )
        .route(
            "/adventures/access/{code}",
            get(handlers::adventures::get_adventure_by_access_code),
        )
        .route("/adventures/{id}", get(handlers::adventures::get_adventure))
        .route(
            "/adventures/{id}/leaderboard",
            get(handlers::adventures::get_leaderboard),
        )
        .route(
            "/problems/access/{code}",
            get(handlers::problems::get_problem_by_access_code),
        )
        .merge(submit)
}

/// Routes that require a valid bearer token.
fn protected_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let submit = Router::new()
        .route(
            "/attempts/{id}/submissions",
            post(handlers::attempts::submit_node),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::submission_rate_limit_middleware,
        ));

    Router::new()
        .route(
            "/adventures",
            get(handlers::adventures::list_my_adventures)
                .post(handlers::adventures::create_adventure),
        )
        .route(
            "/adventures/{id}",
            axum::routing::patch(handlers::adventures::update_adventure)
                .delete(handlers::adventures::delete_adventure),
        )
        .route(
            "/adventures/{id}/attempt",
            post(handlers::adventures::start_attempt),
        )
        .route("/attempts", get(handlers::attempts::list_attempts))
        .route("/attempts/{id}", get(handlers::attempts::get_attempt))
        .route(
            "/attempts/{id}/progress",
            axum::routing::patch(handlers::attempts::record_progress),
        )
        .route(
            "/attempts/{id}/submissions",
            get(handlers::attempts::list_submissions),
        )
        .merge(submit)
        .route(
            "/problems",
            get(handlers::problems::list_my_problems).post(handlers::problems::create_problem),
        )
        .route(
            "/problems/{id}",
            axum::routing::delete(handlers::problems::delete_problem),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn admin_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/adventures/{id}/review",
            post(handlers::admin::review_adventure),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
