use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::Plan;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequestBody {
    pub plan: Plan,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub id: String,
    pub url: Option<String>,
    pub payment_id: Uuid,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub received: bool,
    /// The event id was already processed; nothing was re-applied.
    pub duplicate: bool,
}
