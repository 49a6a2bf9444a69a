use rand::{distributions::Alphanumeric, Rng};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::payments::dto::{CreatePaymentRequest, CreatedPaymentResponse, PaymentStatusResponse};
use crate::payments::repo_types::{NewPayment, Payment, PaymentStatus};
use crate::state::AppState;

pub const TOKEN_LEN: usize = 32;
/// Largest credit count one intake may ask for.
pub const MAX_PAYMENT_CREDITS: i32 = 1_000;
/// Largest amount one intake may declare (R$ 100 000,00).
pub const MAX_PAYMENT_AMOUNT_CENTS: i64 = 10_000_000;

pub(crate) fn confirmation_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Record a manual (PIX-style) payment as pending.
pub async fn create_payment(
    state: &AppState,
    user_id: Uuid,
    req: CreatePaymentRequest,
) -> ApiResult<CreatedPaymentResponse> {
    if req.amount_cents <= 0 {
        return Err(ApiError::validation("amount_cents must be positive"));
    }
    if req.amount_cents > MAX_PAYMENT_AMOUNT_CENTS {
        return Err(ApiError::validation(format!(
            "amount_cents must be at most {MAX_PAYMENT_AMOUNT_CENTS}"
        )));
    }
    if req.credits <= 0 {
        return Err(ApiError::validation("credits must be positive"));
    }
    if req.credits > MAX_PAYMENT_CREDITS {
        return Err(ApiError::validation(format!(
            "credits must be at most {MAX_PAYMENT_CREDITS}"
        )));
    }
    if !req.method.is_manual() {
        return Err(ApiError::validation("method not accepted"));
    }

    let token = confirmation_token();
    let intake_key = state.config.payments.intake_key.clone();
    let payment = state
        .store
        .create_payment(NewPayment {
            user_id,
            amount_cents: req.amount_cents,
            credits: req.credits,
            method: req.method,
            plan: req.plan,
            intake_key: Some(intake_key.clone()),
            confirmation_token: Some(token.clone()),
        })
        .await?;
    info!(
        %user_id,
        payment_id = %payment.id,
        amount_cents = payment.amount_cents,
        credits = payment.credits,
        "payment created"
    );

    let expires_at =
        payment.created_at + TimeDuration::minutes(state.config.payments.token_ttl_minutes);
    Ok(CreatedPaymentResponse {
        payment,
        intake_key,
        confirmation_token: token,
        expires_at,
    })
}

fn due_for_approval(state: &AppState, payment: &Payment, now: OffsetDateTime) -> bool {
    let Some(after) = state.config.payments.auto_approve_after else {
        return false;
    };
    payment.method.is_manual()
        && payment.status == PaymentStatus::Pending
        && now - payment.created_at > after
}

/// Report a payment's status, approving it first when it has been pending
/// longer than the configured threshold.
pub async fn check_status_at(
    state: &AppState,
    caller_id: Uuid,
    payment_id: Uuid,
    now: OffsetDateTime,
) -> ApiResult<PaymentStatusResponse> {
    let payment = state
        .store
        .find_payment(payment_id)
        .await?
        .ok_or(ApiError::PaymentNotFound)?;

    if payment.user_id != caller_id {
        let caller = state.store.find_user(caller_id).await?;
        if !caller.is_some_and(|u| u.is_admin()) {
            return Err(ApiError::PaymentNotFound);
        }
    }

    if !due_for_approval(state, &payment, now) {
        debug!(%payment_id, status = ?payment.status, "payment status checked");
        return Ok(PaymentStatusResponse {
            payment,
            approved_now: false,
        });
    }

    let approval = state.store.approve_payment(payment_id).await?;
    if approval.newly_approved {
        info!(
            %payment_id,
            user_id = %approval.payment.user_id,
            credits = approval.payment.credits,
            "payment approved"
        );
    }
    Ok(PaymentStatusResponse {
        payment: approval.payment,
        approved_now: approval.newly_approved,
    })
}
