//! Checkout gateway backed by the Stripe REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::auth::repo_types::Plan;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("payment provider request failed: {0}")]
    Request(String),

    #[error("payment provider returned status {0}")]
    Status(u16),

    #[error("payment provider response malformed: {0}")]
    Malformed(String),
}

/// What the caller wants to buy.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub customer_email: String,
    pub payment_id: Uuid,
    pub plan: Plan,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Subscription state as reported by the processor.
#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub current_period_end: Option<OffsetDateTime>,
}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_subscription_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, CheckoutError>;
}

#[derive(Clone)]
pub struct StripeCheckout {
    client: Client,
    secret_key: String,
}

impl StripeCheckout {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.into(),
        }
    }

    async fn stripe_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<T, CheckoutError> {
        let url = format!("{STRIPE_API_BASE}{endpoint}");
        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.secret_key, Option::<&str>::None);
        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "stripe request failed");
            CheckoutError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "stripe api error");
            return Err(CheckoutError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CheckoutError::Malformed(e.to_string()))
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
pub fn session_form(req: &CheckoutRequest) -> Vec<(String, String)> {
    [
        ("mode", "subscription".to_string()),
        ("payment_method_types[0]", "card".to_string()),
        ("payment_method_types[1]", "boleto".to_string()),
        ("payment_method_types[2]", "pix".to_string()),
        ("line_items[0][price]", req.price_id.clone()),
        ("line_items[0][quantity]", "1".to_string()),
        ("customer_email", req.customer_email.clone()),
        ("client_reference_id", req.user_id.to_string()),
        ("metadata[user_id]", req.user_id.to_string()),
        ("metadata[payment_id]", req.payment_id.to_string()),
        ("metadata[plan]", req.plan.to_string()),
        ("success_url", req.success_url.clone()),
        ("cancel_url", req.cancel_url.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    customer: String,
    status: String,
    current_period_end: Option<i64>,
}

#[async_trait]
impl CheckoutGateway for StripeCheckout {
    #[instrument(skip(self, req), fields(user_id = %req.user_id, plan = %req.plan))]
    async fn create_subscription_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let form = session_form(req);
        let session: CheckoutSession = self
            .stripe_request(reqwest::Method::POST, "/checkout/sessions", Some(form.as_slice()))
            .await?;
        debug!(session_id = %session.id, "checkout session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, CheckoutError> {
        let raw: RawSubscription = self
            .stripe_request(
                reqwest::Method::GET,
                &format!("/subscriptions/{subscription_id}"),
                None,
            )
            .await?;
        Ok(SubscriptionSnapshot {
            id: raw.id,
            customer_id: raw.customer,
            status: raw.status,
            current_period_end: raw
                .current_period_end
                .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok()),
        })
    }
}
