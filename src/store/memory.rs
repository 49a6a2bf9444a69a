use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PlanGrant, Store, StoreError};
use crate::auth::repo_types::{NewUser, Plan, SubscriptionUpdate, User};
use crate::essays::repo_types::{Essay, EssayFeedback, EssayStatus, NewEssay};
use crate::grading::Grade;
use crate::payments::repo_types::{
    NewPayment, Payment, PaymentApproval, PaymentMethod, PaymentStatus,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    essays: HashMap<Uuid, Essay>,
    payments: HashMap<Uuid, Payment>,
    webhook_events: HashSet<String>,
}

/// In-process store with the same atomicity guarantees as `PgStore`.
/// Backs the test suite.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a payment's creation time, for exercising age-based approval.
    pub async fn backdate_payment(
        &self,
        payment_id: Uuid,
        created_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        let payment = t
            .payments
            .get_mut(&payment_id)
            .ok_or(StoreError::PaymentNotFound)?;
        payment.created_at = created_at;
        Ok(())
    }

    pub async fn essay_count(&self) -> usize {
        self.tables.lock().await.essays.len()
    }
}

/// Newest first, ties broken by id descending like the SQL listings.
fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (OffsetDateTime, Uuid)) {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.email == new.email) {
            return Err(StoreError::EmailTaken);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            name: new.name,
            password_hash: Some(new.password_hash),
            plan: Plan::Free,
            role: new.role,
            credits: new.credits,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_status: None,
            subscription_end_date: None,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t
            .users
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.tables.lock().await.users.values().cloned().collect();
        newest_first(&mut users, |u| (u.created_at, u.id));
        Ok(users)
    }

    async fn apply_plan_grant(&self, user_id: Uuid, grant: PlanGrant) -> Result<User, StoreError> {
        let mut t = self.tables.lock().await;
        let now = OffsetDateTime::now_utc();
        let user = t.users.get_mut(&user_id).ok_or(StoreError::UserNotFound)?;
        let credits = user
            .credits
            .checked_add(grant.credits)
            .ok_or(StoreError::CreditLimit)?;
        user.plan = grant.plan;
        user.credits = credits;
        user.updated_at = now;
        let user = user.clone();

        if grant.plan != Plan::Free || grant.credits > 0 {
            let audit = Payment {
                id: Uuid::new_v4(),
                user_id,
                amount_cents: 0,
                credits: grant.credits,
                method: PaymentMethod::AdminUpgrade,
                plan: grant.plan,
                status: PaymentStatus::Approved,
                intake_key: None,
                confirmation_token: None,
                external_ref: None,
                created_at: now,
                approved_at: Some(now),
            };
            t.payments.insert(audit.id, audit);
        }
        Ok(user)
    }

    async fn update_subscription(
        &self,
        user_id: Uuid,
        update: SubscriptionUpdate,
    ) -> Result<User, StoreError> {
        let mut t = self.tables.lock().await;
        let user = t.users.get_mut(&user_id).ok_or(StoreError::UserNotFound)?;
        if let Some(v) = update.customer_id {
            user.stripe_customer_id = Some(v);
        }
        if let Some(v) = update.subscription_id {
            user.stripe_subscription_id = Some(v);
        }
        if let Some(v) = update.status {
            user.subscription_status = Some(v);
        }
        if let Some(v) = update.end_date {
            user.subscription_end_date = Some(v);
        }
        if let Some(v) = update.plan {
            user.plan = v;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn submit_essay(&self, new: NewEssay) -> Result<Essay, StoreError> {
        let mut t = self.tables.lock().await;
        let user = t.users.get_mut(&new.user_id).ok_or(StoreError::UserNotFound)?;
        if user.credits <= 0 {
            return Err(StoreError::InsufficientCredits);
        }
        user.credits -= 1;

        let essay = Essay {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title,
            theme: new.theme,
            content: new.content,
            status: EssayStatus::Pending,
            competency_scores: [None; 5],
            final_score: None,
            feedback: None,
            created_at: OffsetDateTime::now_utc(),
            corrected_at: None,
        };
        t.essays.insert(essay.id, essay.clone());
        Ok(essay)
    }

    async fn find_essay(&self, id: Uuid) -> Result<Option<Essay>, StoreError> {
        Ok(self.tables.lock().await.essays.get(&id).cloned())
    }

    async fn list_essays(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Essay>, StoreError> {
        let t = self.tables.lock().await;
        let mut essays: Vec<Essay> = t
            .essays
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut essays, |e| (e.created_at, e.id));
        Ok(essays
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn complete_grading(
        &self,
        essay_id: Uuid,
        grade: &Grade,
        feedback: &EssayFeedback,
    ) -> Result<Essay, StoreError> {
        let mut t = self.tables.lock().await;
        let essay = t.essays.get_mut(&essay_id).ok_or(StoreError::EssayNotFound)?;
        if essay.status != EssayStatus::Pending {
            return Err(StoreError::EssayAlreadyCorrected);
        }
        essay.competency_scores = grade.competencies.clone().map(|c| Some(c.score));
        essay.final_score = Some(grade.final_score);
        essay.feedback = Some(feedback.clone());
        essay.status = EssayStatus::Corrected;
        essay.corrected_at = Some(OffsetDateTime::now_utc());
        Ok(essay.clone())
    }

    async fn create_payment(&self, new: NewPayment) -> Result<Payment, StoreError> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&new.user_id) {
            return Err(StoreError::UserNotFound);
        }
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            amount_cents: new.amount_cents,
            credits: new.credits,
            method: new.method,
            plan: new.plan,
            status: PaymentStatus::Pending,
            intake_key: new.intake_key,
            confirmation_token: new.confirmation_token,
            external_ref: None,
            created_at: OffsetDateTime::now_utc(),
            approved_at: None,
        };
        t.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.tables.lock().await.payments.get(&id).cloned())
    }

    async fn list_payments(&self, user_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let t = self.tables.lock().await;
        let mut payments: Vec<Payment> = t
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut payments, |p| (p.created_at, p.id));
        Ok(payments)
    }

    async fn set_payment_external_ref(
        &self,
        payment_id: Uuid,
        external_ref: &str,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        let payment = t
            .payments
            .get_mut(&payment_id)
            .ok_or(StoreError::PaymentNotFound)?;
        payment.external_ref = Some(external_ref.to_string());
        Ok(())
    }

    async fn approve_payment(&self, payment_id: Uuid) -> Result<PaymentApproval, StoreError> {
        let mut t = self.tables.lock().await;
        let mut payment = t
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or(StoreError::PaymentNotFound)?;
        if payment.status == PaymentStatus::Approved {
            return Ok(PaymentApproval {
                payment,
                newly_approved: false,
            });
        }

        let user = t
            .users
            .get_mut(&payment.user_id)
            .ok_or(StoreError::UserNotFound)?;
        user.credits = user
            .credits
            .checked_add(payment.credits)
            .ok_or(StoreError::CreditLimit)?;

        payment.status = PaymentStatus::Approved;
        payment.approved_at = Some(OffsetDateTime::now_utc());
        t.payments.insert(payment.id, payment.clone());
        Ok(PaymentApproval {
            payment,
            newly_approved: true,
        })
    }

    async fn webhook_event_seen(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.webhook_events.contains(event_id))
    }

    async fn record_webhook_event(&self, event_id: &str, _kind: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .webhook_events
            .insert(event_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;
    use crate::grading::{placeholder_grade, GradeSource};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            name: None,
            password_hash: "x".into(),
            role: Role::User,
            credits: 3,
        }
    }

    #[tokio::test]
    async fn emails_are_unique() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@b.co")).await.unwrap();
        assert!(matches!(
            store.create_user(new_user("a@b.co")).await,
            Err(StoreError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn missing_rows_report_not_found() {
        let store = MemoryStore::new();
        let grade = placeholder_grade();
        let feedback = EssayFeedback::from_grade(&grade, GradeSource::Placeholder);
        assert!(matches!(
            store.complete_grading(Uuid::new_v4(), &grade, &feedback).await,
            Err(StoreError::EssayNotFound)
        ));
        assert!(matches!(
            store.approve_payment(Uuid::new_v4()).await,
            Err(StoreError::PaymentNotFound)
        ));
        assert!(matches!(
            store
                .apply_plan_grant(Uuid::new_v4(), PlanGrant { plan: Plan::Basic, credits: 5 })
                .await,
            Err(StoreError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn credit_overflow_is_an_error_and_changes_nothing() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@b.co")).await.unwrap();

        let err = store
            .apply_plan_grant(user.id, PlanGrant { plan: Plan::Premium, credits: i32::MAX })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CreditLimit));
        let after = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(after.credits, 3);
        assert_eq!(after.plan, Plan::Free);
        assert!(store.list_payments(user.id).await.unwrap().is_empty());

        let pending = store
            .create_payment(NewPayment {
                user_id: user.id,
                amount_cents: 100,
                credits: i32::MAX,
                method: PaymentMethod::Pix,
                plan: Plan::Basic,
                intake_key: None,
                confirmation_token: None,
            })
            .await
            .unwrap();
        assert!(matches!(
            store.approve_payment(pending.id).await,
            Err(StoreError::CreditLimit)
        ));
        let payment = store.find_payment(pending.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(store.find_user(user.id).await.unwrap().unwrap().credits, 3);
    }

    #[tokio::test]
    async fn listings_break_timestamp_ties_by_id() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@b.co")).await.unwrap();
        let at = OffsetDateTime::now_utc();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let p = store
                .create_payment(NewPayment {
                    user_id: user.id,
                    amount_cents: 100,
                    credits: 1,
                    method: PaymentMethod::Pix,
                    plan: Plan::Basic,
                    intake_key: None,
                    confirmation_token: None,
                })
                .await
                .unwrap();
            store.backdate_payment(p.id, at).await.unwrap();
            ids.push(p.id);
        }
        ids.sort_by(|a, b| b.cmp(a));

        let listed: Vec<Uuid> = store
            .list_payments(user.id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn subscription_update_keeps_unset_fields() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@b.co")).await.unwrap();
        store
            .update_subscription(
                user.id,
                SubscriptionUpdate {
                    customer_id: Some("cus_1".into()),
                    subscription_id: Some("sub_1".into()),
                    status: Some("active".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let updated = store
            .update_subscription(
                user.id,
                SubscriptionUpdate {
                    status: Some("canceled".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(updated.stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(updated.subscription_status.as_deref(), Some("canceled"));
        assert_eq!(
            store.find_user_by_customer("cus_1").await.unwrap().map(|u| u.id),
            Some(user.id)
        );
    }
}
