use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use tracing::instrument;

use crate::{auth::extractors::AuthUser, error::ApiResult, state::AppState};

use super::dto::{CheckoutRequestBody, CheckoutResponse, WebhookAck};
use super::services;

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/checkout", post(create_checkout))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/stripe", post(stripe_webhook))
}

#[instrument(skip(state, headers, payload))]
pub async fn create_checkout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequestBody>,
) -> ApiResult<Json<CheckoutResponse>> {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    let session = services::create_checkout(&state, user_id, payload.plan, origin).await?;
    Ok(Json(session))
}

/// Raw body is needed: the signature covers the exact bytes Stripe sent.
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());
    let ack = services::handle_webhook(&state, &body, signature).await?;
    Ok(Json(ack))
}
