use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    models::submission::SubmitSolutionRequest,
    services::{judge_service::JudgeService, AppState},
};

/// POST /api/v1/submissions - judge a standalone problem by access code
pub async fn submit_solution(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SubmitSolutionRequest>,
) -> AppResult<impl IntoResponse> {
    let service = JudgeService::new(state.store.clone(), state.executor.clone());
    Ok(Json(service.submit_solution(req).await?))
}
