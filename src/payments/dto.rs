use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::repo_types::Plan;
use crate::payments::repo_types::{Payment, PaymentMethod};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount_cents: i64,
    pub credits: i32,
    pub method: PaymentMethod,
    pub plan: Plan,
}

/// Intake response: where to pay and the token that identifies this payment.
#[derive(Debug, Serialize)]
pub struct CreatedPaymentResponse {
    pub payment: Payment,
    pub intake_key: String,
    pub confirmation_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment: Payment,
    /// True only on the check that performed the approval.
    pub approved_now: bool,
}
