use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::extractors::AuthUser, error::ApiResult, state::AppState};

use super::dto::{CreatePaymentRequest, CreatedPaymentResponse, PaymentStatusResponse};
use super::repo_types::Payment;
use super::services;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list_payments))
        .route("/payments/:id/status", get(payment_status))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/payments", post(create_payment))
}

#[instrument(skip(state, payload))]
pub async fn create_payment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<CreatedPaymentResponse>)> {
    let created = services::create_payment(&state, user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state))]
pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<Vec<Payment>>> {
    Ok(Json(state.store.list_payments(user_id).await?))
}

#[instrument(skip(state))]
pub async fn payment_status(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PaymentStatusResponse>> {
    let status = services::check_status_at(&state, user_id, id, OffsetDateTime::now_utc()).await?;
    Ok(Json(status))
}
