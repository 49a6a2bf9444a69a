//! Stripe subscription checkout and webhook processing.

pub mod dto;
pub mod handlers;
pub mod services;
pub mod stripe;
pub mod webhook;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::checkout_routes())
        .merge(handlers::webhook_routes())
}
