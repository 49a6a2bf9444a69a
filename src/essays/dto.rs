use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::essays::repo_types::{Essay, EssayFeedback, EssayStatus};

#[derive(Debug, Deserialize)]
pub struct SubmitEssayRequest {
    pub title: String,
    pub theme: String,
    pub content: String,
}

/// Full essay as returned by submit, get and correct.
#[derive(Debug, Serialize)]
pub struct EssayResponse {
    pub id: Uuid,
    pub title: String,
    pub theme: String,
    pub content: String,
    pub status: EssayStatus,
    pub competency_scores: [Option<i32>; 5],
    pub final_score: Option<i32>,
    pub feedback: Option<EssayFeedback>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub corrected_at: Option<OffsetDateTime>,
}

impl From<Essay> for EssayResponse {
    fn from(e: Essay) -> Self {
        Self {
            id: e.id,
            title: e.title,
            theme: e.theme,
            content: e.content,
            status: e.status,
            competency_scores: e.competency_scores,
            final_score: e.final_score,
            feedback: e.feedback,
            created_at: e.created_at,
            corrected_at: e.corrected_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EssayListItem {
    pub id: Uuid,
    pub title: String,
    pub theme: String,
    pub status: EssayStatus,
    pub final_score: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Essay> for EssayListItem {
    fn from(e: Essay) -> Self {
        Self {
            id: e.id,
            title: e.title,
            theme: e.theme,
            status: e.status,
            final_score: e.final_score,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 { 20 }

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: default_limit(), offset: 0 }
    }
}

impl Pagination {
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}
