use tracing::info;
use uuid::Uuid;

use crate::admin::dto::UpgradeUserRequest;
use crate::auth::repo_types::User;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::PlanGrant;

/// Largest credit grant one upgrade may apply.
pub const MAX_GRANT_CREDITS: i32 = 1_000;

pub async fn list_users(state: &AppState) -> ApiResult<Vec<User>> {
    Ok(state.store.list_users().await?)
}

/// Set the plan and add (never replace) credits.
pub async fn upgrade_user(
    state: &AppState,
    admin_id: Uuid,
    req: UpgradeUserRequest,
) -> ApiResult<User> {
    if req.credits < 0 {
        return Err(ApiError::validation("credits must be zero or positive"));
    }
    if req.credits > MAX_GRANT_CREDITS {
        return Err(ApiError::validation(format!(
            "credits must be at most {MAX_GRANT_CREDITS}"
        )));
    }
    let user = state
        .store
        .apply_plan_grant(
            req.user_id,
            PlanGrant {
                plan: req.plan,
                credits: req.credits,
            },
        )
        .await?;
    info!(
        %admin_id,
        user_id = %user.id,
        plan = %user.plan,
        added = req.credits,
        credits = user.credits,
        "admin upgrade applied"
    );
    Ok(user)
}
