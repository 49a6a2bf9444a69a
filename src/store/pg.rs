use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{PlanGrant, Store, StoreError};
use crate::auth::repo_types::{NewUser, Plan, SubscriptionUpdate, User};
use crate::essays::repo_types::{Essay, EssayFeedback, EssayRow, NewEssay};
use crate::grading::Grade;
use crate::payments::repo_types::{
    NewPayment, Payment, PaymentApproval, PaymentMethod, PaymentStatus,
};

const USER_COLUMNS: &str = r#"
    id, email, name, password_hash, plan, role, credits,
    stripe_customer_id, stripe_subscription_id, subscription_status,
    subscription_end_date, created_at, updated_at
"#;

const ESSAY_COLUMNS: &str = r#"
    id, user_id, title, theme, content, status,
    c1_score, c2_score, c3_score, c4_score, c5_score,
    final_score, feedback, created_at, corrected_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, user_id, amount_cents, credits, method, plan, status,
    intake_key, confirmation_token, external_ref, created_at, approved_at
"#;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }
}

/// `credits` is an INT column; numeric_value_out_of_range means a grant overflowed it.
fn map_credit_overflow(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("22003") => StoreError::CreditLimit,
        _ => StoreError::Database(e),
    }
}

fn map_unique_email(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::EmailTaken,
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, password_hash, role, credits)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(new.role)
        .bind(new.credits)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_email)?;
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE stripe_customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn apply_plan_grant(&self, user_id: Uuid, grant: PlanGrant) -> Result<User, StoreError> {
        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET plan = $2, credits = credits + $3, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(grant.plan)
        .bind(grant.credits)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_credit_overflow)?
        .ok_or(StoreError::UserNotFound)?;

        if grant.plan != Plan::Free || grant.credits > 0 {
            sqlx::query(
                r#"
                INSERT INTO payments (user_id, amount_cents, credits, method, plan, status, approved_at)
                VALUES ($1, 0, $2, $3, $4, $5, now())
                "#,
            )
            .bind(user_id)
            .bind(grant.credits)
            .bind(PaymentMethod::AdminUpgrade)
            .bind(grant.plan)
            .bind(PaymentStatus::Approved)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(%user_id, plan = %grant.plan, credits = grant.credits, "plan grant applied");
        Ok(user)
    }

    async fn update_subscription(
        &self,
        user_id: Uuid,
        update: SubscriptionUpdate,
    ) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET stripe_customer_id     = COALESCE($2, stripe_customer_id),
                   stripe_subscription_id = COALESCE($3, stripe_subscription_id),
                   subscription_status    = COALESCE($4, subscription_status),
                   subscription_end_date  = COALESCE($5, subscription_end_date),
                   plan                   = COALESCE($6, plan),
                   updated_at             = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(update.customer_id)
        .bind(update.subscription_id)
        .bind(update.status)
        .bind(update.end_date)
        .bind(update.plan)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::UserNotFound)?;
        Ok(user)
    }

    async fn submit_essay(&self, new: NewEssay) -> Result<Essay, StoreError> {
        let mut tx = self.db.begin().await?;

        let debited: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE users
               SET credits = credits - 1, updated_at = now()
             WHERE id = $1 AND credits > 0
            RETURNING credits
            "#,
        )
        .bind(new.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((remaining,)) = debited else {
            tx.rollback().await?;
            return if self.user_exists(new.user_id).await? {
                Err(StoreError::InsufficientCredits)
            } else {
                Err(StoreError::UserNotFound)
            };
        };

        let row = sqlx::query_as::<_, EssayRow>(&format!(
            r#"
            INSERT INTO essays (user_id, title, theme, content, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING {ESSAY_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.theme)
        .bind(&new.content)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(essay_id = %row.id, remaining, "credit debited");
        Ok(row.into())
    }

    async fn find_essay(&self, id: Uuid) -> Result<Option<Essay>, StoreError> {
        let row = sqlx::query_as::<_, EssayRow>(&format!(
            "SELECT {ESSAY_COLUMNS} FROM essays WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Essay::from))
    }

    async fn list_essays(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Essay>, StoreError> {
        let rows = sqlx::query_as::<_, EssayRow>(&format!(
            r#"
            SELECT {ESSAY_COLUMNS}
              FROM essays
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Essay::from).collect())
    }

    async fn complete_grading(
        &self,
        essay_id: Uuid,
        grade: &Grade,
        feedback: &EssayFeedback,
    ) -> Result<Essay, StoreError> {
        let [c1, c2, c3, c4, c5] = &grade.competencies;
        let row = sqlx::query_as::<_, EssayRow>(&format!(
            r#"
            UPDATE essays
               SET c1_score = $2, c2_score = $3, c3_score = $4, c4_score = $5, c5_score = $6,
                   final_score = $7, feedback = $8, status = 'corrected', corrected_at = now()
             WHERE id = $1 AND status = 'pending'
            RETURNING {ESSAY_COLUMNS}
            "#
        ))
        .bind(essay_id)
        .bind(c1.score)
        .bind(c2.score)
        .bind(c3.score)
        .bind(c4.score)
        .bind(c5.score)
        .bind(grade.final_score)
        .bind(Json(feedback))
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.find_essay(essay_id).await? {
                Some(_) => Err(StoreError::EssayAlreadyCorrected),
                None => Err(StoreError::EssayNotFound),
            },
        }
    }

    async fn create_payment(&self, new: NewPayment) -> Result<Payment, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments
                (user_id, amount_cents, credits, method, plan, status, intake_key, confirmation_token)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.amount_cents)
        .bind(new.credits)
        .bind(new.method)
        .bind(new.plan)
        .bind(&new.intake_key)
        .bind(&new.confirmation_token)
        .fetch_one(&self.db)
        .await?;
        Ok(payment)
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(payment)
    }

    async fn list_payments(&self, user_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(payments)
    }

    async fn set_payment_external_ref(
        &self,
        payment_id: Uuid,
        external_ref: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE payments SET external_ref = $2 WHERE id = $1")
            .bind(payment_id)
            .bind(external_ref)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PaymentNotFound);
        }
        Ok(())
    }

    async fn approve_payment(&self, payment_id: Uuid) -> Result<PaymentApproval, StoreError> {
        let mut tx = self.db.begin().await?;

        let approved = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
               SET status = 'approved', approved_at = now()
             WHERE id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(payment) = approved else {
            tx.rollback().await?;
            let payment = self
                .find_payment(payment_id)
                .await?
                .ok_or(StoreError::PaymentNotFound)?;
            return Ok(PaymentApproval {
                payment,
                newly_approved: false,
            });
        };

        sqlx::query("UPDATE users SET credits = credits + $2, updated_at = now() WHERE id = $1")
            .bind(payment.user_id)
            .bind(payment.credits)
            .execute(&mut *tx)
            .await
            .map_err(map_credit_overflow)?;

        tx.commit().await?;
        Ok(PaymentApproval {
            payment,
            newly_approved: true,
        })
    }

    async fn webhook_event_seen(&self, event_id: &str) -> Result<bool, StoreError> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT event_id FROM webhook_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    async fn record_webhook_event(&self, event_id: &str, kind: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, kind)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(kind)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
