use axum::{
    extract::{Extension, Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        attempt::{AttemptsQuery, ProgressRequest},
        submission::SubmitNodeRequest,
    },
    services::{attempt_service::AttemptService, judge_service::JudgeService, AppState},
};

/// GET /api/v1/attempts?adventure_id=
pub async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<AttemptsQuery>,
) -> AppResult<impl IntoResponse> {
    let service = AttemptService::new(state.store.clone());
    let attempts = service
        .list_attempts(&claims.user(), query.adventure_id.as_deref())
        .await?;
    Ok(Json(attempts))
}

/// GET /api/v1/attempts/{id}
pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = AttemptService::new(state.store.clone());
    Ok(Json(service.get_attempt(&id, &claims.user()).await?))
}

/// GET /api/v1/attempts/{id}/submissions
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = AttemptService::new(state.store.clone());
    Ok(Json(service.list_submissions(&id, &claims.user()).await?))
}

/// PATCH /api/v1/attempts/{id}/progress
pub async fn record_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<ProgressRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AttemptService::new(state.store.clone());
    Ok(Json(service.record_progress(&id, &claims.user(), req).await?))
}

/// POST /api/v1/attempts/{id}/submissions - judge code for one node
pub async fn submit_node(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<SubmitNodeRequest>,
) -> AppResult<impl IntoResponse> {
    let service = JudgeService::new(state.store.clone(), state.executor.clone());
    Ok(Json(service.submit_node(&id, req, &claims.user()).await?))
}
