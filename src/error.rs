//! API error type shared by every handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Essay not found")]
    EssayNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Essay already corrected")]
    EssayAlreadyCorrected,

    #[error("Grading service unavailable")]
    GradingUnavailable(String),

    #[error("Payment provider error")]
    PaymentProvider(String),

    #[error("Internal error")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::InvalidCredentials | Self::InvalidSignature(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::UserNotFound | Self::EssayNotFound | Self::PaymentNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::EmailTaken | Self::InsufficientCredits | Self::EssayAlreadyCorrected => {
                StatusCode::CONFLICT
            }
            Self::GradingUnavailable(_) | Self::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::EssayNotFound => "ESSAY_NOT_FOUND",
            Self::PaymentNotFound => "PAYMENT_NOT_FOUND",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::InsufficientCredits => "INSUFFICIENT_CREDITS",
            Self::EssayAlreadyCorrected => "ESSAY_ALREADY_CORRECTED",
            Self::GradingUnavailable(_) => "GRADING_UNAVAILABLE",
            Self::PaymentProvider(_) => "PAYMENT_PROVIDER_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UserNotFound => Self::UserNotFound,
            StoreError::EssayNotFound => Self::EssayNotFound,
            StoreError::PaymentNotFound => Self::PaymentNotFound,
            StoreError::EmailTaken => Self::EmailTaken,
            StoreError::InsufficientCredits => Self::InsufficientCredits,
            StoreError::EssayAlreadyCorrected => Self::EssayAlreadyCorrected,
            StoreError::CreditLimit => Self::validation("credit balance limit exceeded"),
            StoreError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        match &self {
            Self::Internal(detail) => tracing::error!(error = %detail, "internal api error"),
            Self::GradingUnavailable(detail) | Self::PaymentProvider(detail) => {
                tracing::error!(error = %detail, code, "upstream failure")
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
