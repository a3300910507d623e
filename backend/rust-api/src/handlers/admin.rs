use axum::{
    extract::{Extension, Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::adventure::ReviewAdventureRequest,
    services::{adventure_service::AdventureService, AppState},
};

/// POST /api/v1/admin/adventures/{id}/review
pub async fn review_adventure(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<ReviewAdventureRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AdventureService::new(state.store.clone());
    let adventure = service.review(&id, req.decision, &claims.user()).await?;
    Ok(Json(adventure))
}
