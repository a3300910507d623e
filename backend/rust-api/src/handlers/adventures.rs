use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::ValidatedJson,
    middlewares::auth::JwtClaims,
    models::{
        adventure::{CreateAdventureRequest, PublicAdventuresResponse, UpdateAdventureRequest},
        leaderboard::StandingsQuery,
    },
    services::{
        adventure_service::AdventureService, attempt_service::AttemptService,
        leaderboard_service::LeaderboardService, AppState,
    },
};

/// POST /api/v1/adventures
pub async fn create_adventure(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidatedJson(req): ValidatedJson<CreateAdventureRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AdventureService::new(state.store.clone());
    let adventure = service.create(req, &claims.user()).await?;
    Ok((StatusCode::CREATED, Json(adventure)))
}

/// GET /api/v1/adventures - adventures authored by the caller
pub async fn list_my_adventures(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<impl IntoResponse> {
    let service = AdventureService::new(state.store.clone());
    let adventures = service.list_by_creator(&claims.user()).await?;
    Ok(Json(adventures))
}

/// GET /api/v1/adventures/public
pub async fn list_public_adventures(
    State(state): State<Arc<AppState>>,
) -> AppResult<impl IntoResponse> {
    let service = AdventureService::new(state.store.clone());
    let adventures = service.list_public_approved().await?;
    Ok(Json(PublicAdventuresResponse { adventures }))
}

/// GET /api/v1/adventures/access/{code}
pub async fn get_adventure_by_access_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = AdventureService::new(state.store.clone());
    Ok(Json(service.get_by_access_code(&code).await?))
}

/// GET /api/v1/adventures/{id}
pub async fn get_adventure(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = AdventureService::new(state.store.clone());
    Ok(Json(service.get_by_id(&id).await?))
}

/// PATCH /api/v1/adventures/{id}
pub async fn update_adventure(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateAdventureRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AdventureService::new(state.store.clone());
    Ok(Json(service.update(&id, req, &claims.user()).await?))
}

/// DELETE /api/v1/adventures/{id}
pub async fn delete_adventure(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = AdventureService::new(state.store.clone());
    service.delete(&id, &claims.user()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/adventures/{id}/attempt - resume or start the caller's attempt
pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = AttemptService::new(state.store.clone());
    Ok(Json(service.get_or_start(&id, &claims.user()).await?))
}

/// GET /api/v1/adventures/{id}/leaderboard?limit=
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<StandingsQuery>,
) -> AppResult<impl IntoResponse> {
    // 404 for unknown adventures rather than an empty board
    AdventureService::new(state.store.clone())
        .get_by_id(&id)
        .await?;

    let service = LeaderboardService::new(state.store.clone());
    Ok(Json(service.standings(&id, query.limit).await?))
}
