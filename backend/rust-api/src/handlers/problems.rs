use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::ValidatedJson,
    middlewares::auth::JwtClaims,
    models::problem::CreateProblemRequest,
    services::{problem_service::ProblemService, AppState},
};

/// POST /api/v1/problems
pub async fn create_problem(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidatedJson(req): ValidatedJson<CreateProblemRequest>,
) -> AppResult<impl IntoResponse> {
    let service = ProblemService::new(state.store.clone());
    let problem = service.create(req, &claims.user()).await?;
    Ok((StatusCode::CREATED, Json(problem)))
}

/// GET /api/v1/problems
pub async fn list_my_problems(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<impl IntoResponse> {
    let service = ProblemService::new(state.store.clone());
    Ok(Json(service.list_by_creator(&claims.user()).await?))
}

/// GET /api/v1/problems/access/{code}
pub async fn get_problem_by_access_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = ProblemService::new(state.store.clone());
    Ok(Json(service.get_by_access_code(&code).await?))
}

/// DELETE /api/v1/problems/{id}
pub async fn delete_problem(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = ProblemService::new(state.store.clone());
    service.delete(&id, &claims.user()).await?;
    Ok(StatusCode::NO_CONTENT)
}
