use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    Card,
    Boleto,
    StripeCheckout,
    /// Audit rows written by admin upgrades. Never accepted from clients.
    AdminUpgrade,
}

impl PaymentMethod {
    /// Methods a client may declare at intake. Only these are eligible for
    /// age-based approval; checkout payments wait for the signed webhook.
    pub fn is_manual(self) -> bool {
        matches!(self, Self::Pix | Self::Card | Self::Boleto)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub credits: i32,
    pub method: PaymentMethod,
    pub plan: Plan,
    pub status: PaymentStatus,
    pub intake_key: Option<String>,
    #[serde(skip_serializing)]
    pub confirmation_token: Option<String>,
    pub external_ref: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub approved_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub credits: i32,
    pub method: PaymentMethod,
    pub plan: Plan,
    pub intake_key: Option<String>,
    pub confirmation_token: Option<String>,
}

/// Outcome of an approval attempt.
#[derive(Debug, Clone)]
pub struct PaymentApproval {
    pub payment: Payment,
    /// `true` only for the call that flipped pending → approved and granted credits.
    pub newly_approved: bool,
}
