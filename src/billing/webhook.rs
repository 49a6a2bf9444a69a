//! Stripe webhook signature verification and event parsing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Accepted clock skew between Stripe's timestamp and ours.
pub const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("missing v1 signature")]
    MissingSignature,

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("timestamp outside tolerance")]
    StaleTimestamp,

    #[error("signature mismatch")]
    Mismatch,

    #[error("unparseable payload: {0}")]
    Payload(String),
}

/// A verified event we know how to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripeEvent {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionUpdated(SubscriptionChange),
    SubscriptionDeleted(SubscriptionChange),
    Ignored(String),
}

impl StripeEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::CheckoutCompleted(_) => "checkout.session.completed",
            Self::SubscriptionUpdated(_) => "customer.subscription.updated",
            Self::SubscriptionDeleted(_) => "customer.subscription.deleted",
            Self::Ignored(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub user_id: Option<String>,
    pub payment_id: Option<String>,
    pub plan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: String,
    pub current_period_end: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEvent {
    pub id: String,
    pub event: StripeEvent,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<VerifiedEvent, WebhookError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.verify_at(payload, signature_header, now)?;
        parse_event(payload)
    }

    /// Check `t=<ts>,v1=<hex>` against HMAC-SHA256 of `"<ts>.<payload>"`.
    /// Any of several `v1` entries may match (secret rotation).
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<(), WebhookError> {
        let mut timestamp: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in signature_header.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => candidates.push(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MissingTimestamp)?;
        if candidates.is_empty() {
            return Err(WebhookError::MissingSignature);
        }
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| WebhookError::InvalidTimestamp)?;

        let matched = candidates.iter().any(|candidate| {
            let Ok(expected) = hex::decode(candidate) else {
                return false;
            };
            let mut mac = self.mac();
            mac.update(timestamp.as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.verify_slice(&expected).is_ok()
        });
        if !matched {
            warn!("webhook signature mismatch");
            return Err(WebhookError::Mismatch);
        }

        if (now - ts).abs() > TOLERANCE_SECS {
            warn!(timestamp = ts, now, "webhook timestamp outside tolerance");
            return Err(WebhookError::StaleTimestamp);
        }
        Ok(())
    }

    /// Produce a header value Stripe would send for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let mut mac = self.mac();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> Hmac<Sha256> {
        Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size")
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    user_id: Option<String>,
    payment_id: Option<String>,
    plan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    customer: String,
    status: String,
    current_period_end: Option<i64>,
}

pub fn parse_event(payload: &[u8]) -> Result<VerifiedEvent, WebhookError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))?;
    debug!(event_id = %raw.id, event_type = %raw.event_type, "parsed webhook event");

    let event = match raw.event_type.as_str() {
        "checkout.session.completed" => {
            let s: RawCheckoutSession = serde_json::from_value(raw.data.object)
                .map_err(|e| WebhookError::Payload(e.to_string()))?;
            let meta = s.metadata.unwrap_or_default();
            StripeEvent::CheckoutCompleted(CheckoutCompleted {
                session_id: s.id,
                customer_id: s.customer,
                subscription_id: s.subscription,
                user_id: meta.user_id.or(s.client_reference_id),
                payment_id: meta.payment_id,
                plan: meta.plan,
            })
        }
        kind @ ("customer.subscription.updated" | "customer.subscription.deleted") => {
            let s: RawSubscription = serde_json::from_value(raw.data.object)
                .map_err(|e| WebhookError::Payload(e.to_string()))?;
            let change = SubscriptionChange {
                subscription_id: s.id,
                customer_id: s.customer,
                status: s.status,
                current_period_end: s
                    .current_period_end
                    .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok()),
            };
            if kind == "customer.subscription.updated" {
                StripeEvent::SubscriptionUpdated(change)
            } else {
                StripeEvent::SubscriptionDeleted(change)
            }
        }
        other => StripeEvent::Ignored(other.to_string()),
    };

    Ok(VerifiedEvent { id: raw.id, event })
}
