use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, instrument, warn};

use super::{CompetencyScore, Grade, GradeRequest, GradeSource, GradingError, GradingGateway};

/// Remote grading service reached over HTTPS/JSON.
#[derive(Clone)]
pub struct HttpGrader {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGrader {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl GradingGateway for HttpGrader {
    #[instrument(skip(self, req), fields(endpoint = %self.endpoint))]
    async fn grade(&self, req: &GradeRequest<'_>) -> Result<Grade, GradingError> {
        let mut request = self.client.post(&self.endpoint).json(req);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "grading request failed");
            GradingError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "grading service error");
            return Err(GradingError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GradingError::Unavailable(e.to_string()))?;
        let grade = parse_grade(&body)?;
        debug!(final_score = grade.final_score, "essay graded");
        Ok(grade)
    }
}

/// Wire shape of the grading service response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGrade {
    c1_score: i32,
    #[serde(default)]
    c1_feedback: String,
    c2_score: i32,
    #[serde(default)]
    c2_feedback: String,
    c3_score: i32,
    #[serde(default)]
    c3_feedback: String,
    c4_score: i32,
    #[serde(default)]
    c4_feedback: String,
    c5_score: i32,
    #[serde(default)]
    c5_feedback: String,
    final_score: Option<i32>,
    #[serde(default)]
    general_feedback: String,
    #[serde(default)]
    suggestions: Vec<String>,
}

impl TryFrom<RawGrade> for Grade {
    type Error = GradingError;

    fn try_from(r: RawGrade) -> Result<Self, Self::Error> {
        let competencies = [
            CompetencyScore { score: r.c1_score, feedback: r.c1_feedback },
            CompetencyScore { score: r.c2_score, feedback: r.c2_feedback },
            CompetencyScore { score: r.c3_score, feedback: r.c3_feedback },
            CompetencyScore { score: r.c4_score, feedback: r.c4_feedback },
            CompetencyScore { score: r.c5_score, feedback: r.c5_feedback },
        ];
        let mut grade = Self {
            competencies,
            final_score: 0,
            general_feedback: r.general_feedback,
            suggestions: r.suggestions,
        };
        grade.final_score = match r.final_score {
            Some(score) => score,
            None => grade
                .competency_total()
                .ok_or_else(|| GradingError::Malformed("competency scores overflow".into()))?,
        };
        Ok(grade)
    }
}

/// Parse and range-check a grading response body.
pub fn parse_grade(body: &[u8]) -> Result<Grade, GradingError> {
    let raw: RawGrade =
        serde_json::from_slice(body).map_err(|e| GradingError::Malformed(e.to_string()))?;
    let grade = Grade::try_from(raw)?;
    grade.validate()?;
    Ok(grade)
}

/// In-process grader returning the fixed placeholder result.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderGrader;

#[async_trait]
impl GradingGateway for PlaceholderGrader {
    async fn grade(&self, _req: &GradeRequest<'_>) -> Result<Grade, GradingError> {
        Ok(placeholder_grade())
    }

    fn source(&self) -> GradeSource {
        GradeSource::Placeholder
    }
}

/// Canned result: 180 on every competency, 900 overall.
pub fn placeholder_grade() -> Grade {
    let notes = [
        "Strong command of formal written Portuguese with very few slips.",
        "Clear grasp of the prompt and productive use of the theme.",
        "Well organized argumentative structure with good cohesion.",
        "Solid argumentation backed by relevant cultural references.",
        "Complete intervention proposal covering every required element.",
    ];
    Grade {
        competencies: notes.map(|n| CompetencyScore {
            score: 180,
            feedback: n.to_string(),
        }),
        final_score: 900,
        general_feedback: "Automatic grading is not available right now; this is a provisional \
                           assessment."
            .to_string(),
        suggestions: vec![
            "Review nominal agreement for full precision.".to_string(),
            "Develop the agents of the intervention proposal further.".to_string(),
            "Tie cultural references more explicitly to each argument.".to_string(),
        ],
    }
}
