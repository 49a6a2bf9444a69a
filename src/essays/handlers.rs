use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::extractors::AuthUser, error::ApiResult, state::AppState};

use super::dto::{EssayListItem, EssayResponse, Pagination, SubmitEssayRequest};
use super::services;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/essays", get(list_essays))
        .route("/essays/:id", get(get_essay))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/essays", post(submit_essay))
        .route("/essays/:id/correct", post(correct_essay))
}

#[instrument(skip(state, payload))]
pub async fn submit_essay(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SubmitEssayRequest>,
) -> ApiResult<(StatusCode, HeaderMap, Json<EssayResponse>)> {
    let essay = services::submit_essay(&state, user_id, payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/essays/{}", essay.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(essay.into())))
}

#[instrument(skip(state))]
pub async fn list_essays(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> ApiResult<Json<Vec<EssayListItem>>> {
    let essays = services::list_essays(&state, user_id, &p).await?;
    Ok(Json(essays.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn get_essay(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EssayResponse>> {
    let essay = services::get_essay(&state, user_id, id).await?;
    Ok(Json(essay.into()))
}

#[instrument(skip(state))]
pub async fn correct_essay(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EssayResponse>> {
    let essay = services::grade_essay(&state, user_id, id).await?;
    Ok(Json(essay.into()))
}
