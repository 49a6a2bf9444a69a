use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::repo_types::{Plan, SubscriptionUpdate};
use crate::billing::dto::{CheckoutResponse, WebhookAck};
use crate::billing::stripe::CheckoutRequest;
use crate::billing::webhook::{
    CheckoutCompleted, StripeEvent, SubscriptionChange, WebhookError, WebhookVerifier,
};
use crate::error::{ApiError, ApiResult};
use crate::payments::repo_types::{NewPayment, PaymentMethod};
use crate::state::AppState;

/// Open a Stripe subscription checkout for `plan`. A pending payment is
/// recorded first so the webhook can approve it by id.
pub async fn create_checkout(
    state: &AppState,
    user_id: Uuid,
    plan: Plan,
    origin: Option<&str>,
) -> ApiResult<CheckoutResponse> {
    if !plan.is_paid() {
        return Err(ApiError::validation("free plan cannot be purchased"));
    }
    let price_id = state
        .config
        .stripe
        .prices
        .price_id(plan)
        .ok_or_else(|| ApiError::validation(format!("plan {plan} is not available for checkout")))?
        .to_string();

    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    let payment = state
        .store
        .create_payment(NewPayment {
            user_id,
            amount_cents: plan.price_cents(),
            credits: plan.credit_allotment(),
            method: PaymentMethod::StripeCheckout,
            plan,
            intake_key: None,
            confirmation_token: None,
        })
        .await?;

    let base = origin
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .unwrap_or(state.config.stripe.public_base_url.as_str())
        .trim_end_matches('/');
    let request = CheckoutRequest {
        user_id,
        customer_email: user.email,
        payment_id: payment.id,
        plan,
        price_id,
        success_url: format!("{base}/dashboard?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{base}/plans"),
    };

    let session = state
        .checkout
        .create_subscription_session(&request)
        .await
        .map_err(|e| ApiError::PaymentProvider(e.to_string()))?;
    state
        .store
        .set_payment_external_ref(payment.id, &session.id)
        .await?;
    info!(%user_id, payment_id = %payment.id, session_id = %session.id, %plan, "checkout session created");

    Ok(CheckoutResponse {
        id: session.id,
        url: session.url,
        payment_id: payment.id,
    })
}

/// Verify, de-duplicate and apply one webhook delivery. The event id is
/// recorded only after its effects succeed.
pub async fn handle_webhook(
    state: &AppState,
    payload: &[u8],
    signature: Option<&str>,
) -> ApiResult<WebhookAck> {
    let signature =
        signature.ok_or_else(|| ApiError::InvalidSignature("missing Stripe-Signature".into()))?;
    let verifier = WebhookVerifier::new(state.config.stripe.webhook_secret.as_str());
    let verified = verifier
        .verify_and_parse(payload, signature)
        .map_err(|e| match e {
            WebhookError::Payload(msg) => ApiError::validation(format!("malformed event: {msg}")),
            other => ApiError::InvalidSignature(other.to_string()),
        })?;

    if state.store.webhook_event_seen(&verified.id).await? {
        info!(event_id = %verified.id, kind = verified.event.kind(), "duplicate webhook delivery");
        return Ok(WebhookAck {
            received: true,
            duplicate: true,
        });
    }

    match &verified.event {
        StripeEvent::CheckoutCompleted(c) => apply_checkout_completed(state, c).await?,
        StripeEvent::SubscriptionUpdated(change) => {
            apply_subscription_change(state, change, change.status.clone()).await?
        }
        StripeEvent::SubscriptionDeleted(change) => {
            apply_subscription_change(state, change, "canceled".to_string()).await?
        }
        StripeEvent::Ignored(kind) => info!(event_id = %verified.id, %kind, "webhook event ignored"),
    }

    state
        .store
        .record_webhook_event(&verified.id, verified.event.kind())
        .await?;
    Ok(WebhookAck {
        received: true,
        duplicate: false,
    })
}

async fn apply_checkout_completed(state: &AppState, c: &CheckoutCompleted) -> ApiResult<()> {
    let (Some(raw_user_id), Some(subscription_id)) = (&c.user_id, &c.subscription_id) else {
        warn!(session_id = %c.session_id, "checkout session without user or subscription");
        return Err(ApiError::validation("missing metadata or subscription id"));
    };
    let user_id: Uuid = raw_user_id
        .parse()
        .map_err(|_| ApiError::validation("metadata user_id is not a UUID"))?;
    if state.store.find_user(user_id).await?.is_none() {
        return Err(ApiError::UserNotFound);
    }

    let payment = match c.payment_id.as_deref().and_then(|p| p.parse::<Uuid>().ok()) {
        Some(payment_id) => Some(
            state
                .store
                .find_payment(payment_id)
                .await?
                .filter(|p| p.user_id == user_id && p.method == PaymentMethod::StripeCheckout)
                .ok_or(ApiError::PaymentNotFound)?,
        ),
        None => {
            warn!(%user_id, session_id = %c.session_id, "checkout completed without payment id");
            None
        }
    };

    let subscription = state
        .checkout
        .retrieve_subscription(subscription_id)
        .await
        .map_err(|e| {
            error!(%subscription_id, error = %e, "retrieve subscription failed");
            ApiError::PaymentProvider(e.to_string())
        })?;

    let plan = c.plan.as_deref().and_then(|p| p.parse::<Plan>().ok());
    state
        .store
        .update_subscription(
            user_id,
            SubscriptionUpdate {
                customer_id: c.customer_id.clone().or(Some(subscription.customer_id)),
                subscription_id: Some(subscription.id),
                status: Some(subscription.status),
                end_date: subscription.current_period_end,
                plan,
            },
        )
        .await?;

    if let Some(payment) = payment {
        let approval = state.store.approve_payment(payment.id).await?;
        info!(
            %user_id,
            payment_id = %payment.id,
            newly_approved = approval.newly_approved,
            credits = approval.payment.credits,
            "checkout payment approved"
        );
    }
    Ok(())
}

async fn apply_subscription_change(
    state: &AppState,
    change: &SubscriptionChange,
    status: String,
) -> ApiResult<()> {
    let user = state
        .store
        .find_user_by_customer(&change.customer_id)
        .await?
        .ok_or_else(|| {
            warn!(customer_id = %change.customer_id, "no user for subscription customer");
            ApiError::UserNotFound
        })?;

    let canceled = status == "canceled";
    state
        .store
        .update_subscription(
            user.id,
            SubscriptionUpdate {
                status: Some(status),
                end_date: if canceled { None } else { change.current_period_end },
                ..Default::default()
            },
        )
        .await?;
    info!(user_id = %user.id, subscription_id = %change.subscription_id, canceled, "subscription updated");
    Ok(())
}
