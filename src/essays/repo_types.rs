use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::grading::{CompetencyScore, Grade, GradeSource};

pub const FEEDBACK_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "essay_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EssayStatus {
    Pending,
    Corrected,
}

/// Versioned feedback document stored in `essays.feedback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssayFeedback {
    pub version: u16,
    pub source: GradeSource,
    pub competencies: Vec<CompetencyScore>,
    pub general_feedback: String,
    pub suggestions: Vec<String>,
}

impl EssayFeedback {
    pub fn from_grade(grade: &Grade, source: GradeSource) -> Self {
        Self {
            version: FEEDBACK_VERSION,
            source,
            competencies: grade.competencies.to_vec(),
            general_feedback: grade.general_feedback.clone(),
            suggestions: grade.suggestions.clone(),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct EssayRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub theme: String,
    pub content: String,
    pub status: EssayStatus,
    pub c1_score: Option<i32>,
    pub c2_score: Option<i32>,
    pub c3_score: Option<i32>,
    pub c4_score: Option<i32>,
    pub c5_score: Option<i32>,
    pub final_score: Option<i32>,
    pub feedback: Option<Json<EssayFeedback>>,
    pub created_at: OffsetDateTime,
    pub corrected_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Essay {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub theme: String,
    pub content: String,
    pub status: EssayStatus,
    pub competency_scores: [Option<i32>; 5],
    pub final_score: Option<i32>,
    pub feedback: Option<EssayFeedback>,
    pub created_at: OffsetDateTime,
    pub corrected_at: Option<OffsetDateTime>,
}

impl From<EssayRow> for Essay {
    fn from(r: EssayRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            theme: r.theme,
            content: r.content,
            status: r.status,
            competency_scores: [r.c1_score, r.c2_score, r.c3_score, r.c4_score, r.c5_score],
            final_score: r.final_score,
            feedback: r.feedback.map(|Json(f)| f),
            created_at: r.created_at,
            corrected_at: r.corrected_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewEssay {
    pub user_id: Uuid,
    pub title: String,
    pub theme: String,
    pub content: String,
}
