use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{dto::PublicUser, extractors::AdminUser},
    error::ApiResult,
    state::AppState,
};

use super::dto::{UpgradeUserRequest, UserListResponse};
use super::services;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/upgrade-user", post(upgrade_user))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<Json<UserListResponse>> {
    let users = services::list_users(&state).await?;
    let total = users.len();
    Ok(Json(UserListResponse {
        users: users.into_iter().map(PublicUser::from).collect(),
        total,
    }))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.id))]
pub async fn upgrade_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<UpgradeUserRequest>,
) -> ApiResult<Json<PublicUser>> {
    let user = services::upgrade_user(&state, admin.id, payload).await?;
    Ok(Json(user.into()))
}
