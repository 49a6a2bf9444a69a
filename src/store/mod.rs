//! Persistence for users, essays, payments and processed webhook events.
//!
//! Every operation that touches more than one row is atomic: `PgStore` runs
//! it in one transaction with conditional updates, `MemoryStore` holds its
//! lock for the whole operation.

#[cfg(test)]
pub mod memory;
pub mod pg;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, Plan, SubscriptionUpdate, User};
use crate::essays::repo_types::{Essay, EssayFeedback, NewEssay};
use crate::grading::Grade;
use crate::payments::repo_types::{NewPayment, Payment, PaymentApproval};

#[cfg(test)]
pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,

    #[error("essay not found")]
    EssayNotFound,

    #[error("payment not found")]
    PaymentNotFound,

    #[error("email already registered")]
    EmailTaken,

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("essay already corrected")]
    EssayAlreadyCorrected,

    #[error("credit balance out of range")]
    CreditLimit,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Plan change applied by an admin.
#[derive(Debug, Clone, Copy)]
pub struct PlanGrant {
    pub plan: Plan,
    pub credits: i32,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Set the plan, add credits and, when `plan != free || credits > 0`,
    /// write an approved `admin_upgrade` audit payment.
    async fn apply_plan_grant(&self, user_id: Uuid, grant: PlanGrant) -> Result<User, StoreError>;

    async fn update_subscription(
        &self,
        user_id: Uuid,
        update: SubscriptionUpdate,
    ) -> Result<User, StoreError>;

    /// Take one credit from the owner and insert the essay as pending.
    async fn submit_essay(&self, new: NewEssay) -> Result<Essay, StoreError>;
    async fn find_essay(&self, id: Uuid) -> Result<Option<Essay>, StoreError>;
    async fn list_essays(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Essay>, StoreError>;

    /// Write all score fields and flip the essay to corrected. Fails with
    /// `EssayAlreadyCorrected` unless the essay is still pending.
    async fn complete_grading(
        &self,
        essay_id: Uuid,
        grade: &Grade,
        feedback: &EssayFeedback,
    ) -> Result<Essay, StoreError>;

    async fn create_payment(&self, new: NewPayment) -> Result<Payment, StoreError>;
    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;
    async fn list_payments(&self, user_id: Uuid) -> Result<Vec<Payment>, StoreError>;
    async fn set_payment_external_ref(
        &self,
        payment_id: Uuid,
        external_ref: &str,
    ) -> Result<(), StoreError>;

    /// Approve a pending payment and credit its owner. Approving an already
    /// approved payment returns it unchanged with `newly_approved = false`.
    async fn approve_payment(&self, payment_id: Uuid) -> Result<PaymentApproval, StoreError>;

    async fn webhook_event_seen(&self, event_id: &str) -> Result<bool, StoreError>;
    async fn record_webhook_event(&self, event_id: &str, kind: &str) -> Result<(), StoreError>;
}
