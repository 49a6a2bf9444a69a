use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::auth::repo_types::Plan;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Stripe price ids, one per paid plan. A missing id means the plan
/// cannot be bought through checkout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanPrices {
    pub basic: Option<String>,
    pub plus: Option<String>,
    pub premium: Option<String>,
}

impl PlanPrices {
    pub fn price_id(&self, plan: Plan) -> Option<&str> {
        match plan {
            Plan::Free => None,
            Plan::Basic => self.basic.as_deref(),
            Plan::Plus => self.plus.as_deref(),
            Plan::Premium => self.premium.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub prices: PlanPrices,
    pub public_base_url: String,
}

/// What to do when the grading service fails or answers garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Surface `GRADING_UNAVAILABLE` and leave the essay pending.
    Error,
    /// Store the canned placeholder result.
    Placeholder,
}

impl std::str::FromStr for FallbackPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "placeholder" => Ok(Self::Placeholder),
            other => anyhow::bail!("unknown grading fallback policy {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradingConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub fallback: FallbackPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Pending payments older than this are approved on status check.
    /// `None` turns the heuristic off and leaves approval to webhooks.
    pub auto_approve_after: Option<Duration>,
    pub intake_key: String,
    pub token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub stripe: StripeConfig,
    pub grading: GradingConfig,
    pub payments: PaymentsConfig,
    pub admin_emails: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "essayiq".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "essayiq-users".into()),
            ttl_minutes: parse_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: parse_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let stripe = StripeConfig {
            secret_key: std::env::var("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY")?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .context("STRIPE_WEBHOOK_SECRET")?,
            prices: PlanPrices {
                basic: non_empty_var("STRIPE_PRICE_BASIC"),
                plus: non_empty_var("STRIPE_PRICE_PLUS"),
                premium: non_empty_var("STRIPE_PRICE_PREMIUM"),
            },
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
        };
        let grading = GradingConfig {
            endpoint: non_empty_var("GRADING_URL"),
            api_key: non_empty_var("GRADING_API_KEY"),
            timeout_secs: parse_or("GRADING_TIMEOUT_SECS", 60),
            fallback: match non_empty_var("GRADING_FALLBACK") {
                Some(v) => v.parse()?,
                None => FallbackPolicy::Error,
            },
        };
        let payments = PaymentsConfig {
            auto_approve_after: parse_auto_approve(
                std::env::var("PAYMENT_AUTO_APPROVE_SECS").ok().as_deref(),
            )?,
            intake_key: std::env::var("PAYMENT_INTAKE_KEY")
                .unwrap_or_else(|_| "payments@essayiq.local".into()),
            token_ttl_minutes: 30,
        };
        let admin_emails = parse_email_list(&std::env::var("ADMIN_EMAILS").unwrap_or_default());

        Ok(Self {
            database_url,
            jwt,
            stripe,
            grading,
            payments,
            admin_emails,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e == email)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_auto_approve(raw: Option<&str>) -> anyhow::Result<Option<Duration>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Some(Duration::from_secs(30))),
        Some("off") | Some("none") => Ok(None),
        Some(v) => {
            let secs: u64 = v
                .parse()
                .with_context(|| format!("PAYMENT_AUTO_APPROVE_SECS={v:?}"))?;
            Ok(Some(Duration::from_secs(secs)))
        }
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
