use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Basic,
    Plus,
    Premium,
}

impl Plan {
    /// Credits granted when the plan is bought (or on signup for `Free`).
    pub const fn credit_allotment(&self) -> i32 {
        match self {
            Self::Free => 3,
            Self::Basic => 5,
            Self::Plus => 15,
            Self::Premium => 30,
        }
    }

    /// Monthly price in cents (BRL).
    pub const fn price_cents(&self) -> i64 {
        match self {
            Self::Free => 0,
            Self::Basic => 1_990,
            Self::Plus => 3_990,
            Self::Premium => 6_990,
        }
    }

    pub const fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Basic => write!(f, "basic"),
            Self::Plus => write!(f, "plus"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "plus" => Ok(Self::Plus),
            "premium" => Ok(Self::Premium),
            other => Err(format!("unknown plan {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // argon2 PHC string
    pub plan: Plan,
    pub role: Role,
    pub credits: i32,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub subscription_end_date: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub credits: i32,
}

/// Fields written when the payment processor reports subscription changes.
/// `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdate {
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub status: Option<String>,
    pub end_date: Option<OffsetDateTime>,
    pub plan: Option<Plan>,
}
