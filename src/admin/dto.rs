use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::dto::PublicUser;
use crate::auth::repo_types::Plan;

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<PublicUser>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeUserRequest {
    pub user_id: Uuid,
    pub plan: Plan,
    #[serde(default)]
    pub credits: i32,
}
