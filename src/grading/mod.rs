//! Grading gateway: turns essay text into per-competency scores.
//!
//! Two implementations exist. [`client::HttpGrader`] posts the essay to the
//! remote grading service; [`client::PlaceholderGrader`] answers in-process
//! with a fixed result and is used when no remote endpoint is configured.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{placeholder_grade, HttpGrader, PlaceholderGrader};

pub const COMPETENCY_MAX: i32 = 200;
pub const FINAL_MAX: i32 = 1000;

/// Essay fields sent to the grader.
#[derive(Debug, Clone, Serialize)]
pub struct GradeRequest<'a> {
    pub title: &'a str,
    pub theme: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencyScore {
    pub score: i32,
    pub feedback: String,
}

/// Structured grading result for the five ENEM competencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub competencies: [CompetencyScore; 5],
    pub final_score: i32,
    pub general_feedback: String,
    pub suggestions: Vec<String>,
}

impl Grade {
    pub fn validate(&self) -> Result<(), GradingError> {
        for (i, c) in self.competencies.iter().enumerate() {
            if !(0..=COMPETENCY_MAX).contains(&c.score) {
                return Err(GradingError::Malformed(format!(
                    "competency {} score {} out of range",
                    i + 1,
                    c.score
                )));
            }
        }
        if !(0..=FINAL_MAX).contains(&self.final_score) {
            return Err(GradingError::Malformed(format!(
                "final score {} out of range",
                self.final_score
            )));
        }
        Ok(())
    }

    /// Sum of the five competency scores, `None` on overflow.
    pub fn competency_total(&self) -> Option<i32> {
        self.competencies
            .iter()
            .try_fold(0i32, |acc, c| acc.checked_add(c.score))
    }
}

/// Where a stored grade came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeSource {
    Model,
    Placeholder,
    Fallback,
}

#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("grading service unreachable: {0}")]
    Unavailable(String),

    #[error("grading service returned status {0}")]
    Status(u16),

    #[error("grading service returned malformed output: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait GradingGateway: Send + Sync {
    /// Grade one essay.
    async fn grade(&self, req: &GradeRequest<'_>) -> Result<Grade, GradingError>;

    /// Source tag recorded with successful results from this gateway.
    fn source(&self) -> GradeSource {
        GradeSource::Model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_grade_is_valid_and_sums_to_final() {
        let g = placeholder_grade();
        g.validate().expect("placeholder must validate");
        assert_eq!(g.final_score, 900);
        assert_eq!(g.competency_total(), Some(900));
    }

    #[test]
    fn validate_rejects_out_of_range_scores() {
        let mut g = placeholder_grade();
        g.competencies[2].score = 201;
        assert!(matches!(g.validate(), Err(GradingError::Malformed(_))));

        let mut g = placeholder_grade();
        g.final_score = 1001;
        assert!(matches!(g.validate(), Err(GradingError::Malformed(_))));
    }
}
