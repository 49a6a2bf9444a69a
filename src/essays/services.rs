use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::FallbackPolicy;
use crate::error::{ApiError, ApiResult};
use crate::essays::dto::{Pagination, SubmitEssayRequest};
use crate::essays::repo_types::{Essay, EssayFeedback, EssayStatus, NewEssay};
use crate::grading::{placeholder_grade, GradeRequest, GradeSource};
use crate::state::AppState;

pub const MIN_CONTENT_CHARS: usize = 20;
pub const MAX_TITLE_CHARS: usize = 200;

fn validate(req: SubmitEssayRequest) -> ApiResult<(String, String, String)> {
    let title = req.title.trim().to_string();
    let theme = req.theme.trim().to_string();
    let content = req.content.trim().to_string();

    if title.is_empty() || theme.is_empty() || content.is_empty() {
        return Err(ApiError::validation("title, theme and content are required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    if content.chars().count() < MIN_CONTENT_CHARS {
        return Err(ApiError::validation(format!(
            "content must be at least {MIN_CONTENT_CHARS} characters"
        )));
    }
    Ok((title, theme, content))
}

/// Spend one credit and store the essay as pending.
pub async fn submit_essay(
    state: &AppState,
    user_id: Uuid,
    req: SubmitEssayRequest,
) -> ApiResult<Essay> {
    let (title, theme, content) = validate(req)?;
    let essay = state
        .store
        .submit_essay(NewEssay {
            user_id,
            title,
            theme,
            content,
        })
        .await
        .map_err(|e| {
            warn!(%user_id, error = %e, "essay submission rejected");
            ApiError::from(e)
        })?;
    info!(%user_id, essay_id = %essay.id, "essay submitted");
    Ok(essay)
}

pub async fn list_essays(state: &AppState, user_id: Uuid, p: &Pagination) -> ApiResult<Vec<Essay>> {
    let (limit, offset) = p.clamped();
    Ok(state.store.list_essays(user_id, limit, offset).await?)
}

/// Owner-scoped lookup. Someone else's essay is reported as missing.
pub async fn get_essay(state: &AppState, user_id: Uuid, essay_id: Uuid) -> ApiResult<Essay> {
    match state.store.find_essay(essay_id).await? {
        Some(essay) if essay.user_id == user_id => Ok(essay),
        _ => Err(ApiError::EssayNotFound),
    }
}

/// Grade a pending essay and persist the result. Callable by the owner or an admin.
pub async fn grade_essay(state: &AppState, caller_id: Uuid, essay_id: Uuid) -> ApiResult<Essay> {
    let essay = state
        .store
        .find_essay(essay_id)
        .await?
        .ok_or(ApiError::EssayNotFound)?;

    if essay.user_id != caller_id {
        let caller = state.store.find_user(caller_id).await?;
        if !caller.is_some_and(|u| u.is_admin()) {
            return Err(ApiError::EssayNotFound);
        }
    }
    if essay.status == EssayStatus::Corrected {
        return Err(ApiError::EssayAlreadyCorrected);
    }

    let request = GradeRequest {
        title: &essay.title,
        theme: &essay.theme,
        content: &essay.content,
    };
    let outcome = state
        .grader
        .grade(&request)
        .await
        .and_then(|grade| grade.validate().map(|_| grade));

    let (grade, source) = match outcome {
        Ok(grade) => (grade, state.grader.source()),
        Err(e) => match state.config.grading.fallback {
            FallbackPolicy::Error => {
                error!(%essay_id, error = %e, "grading failed; essay left pending");
                return Err(ApiError::GradingUnavailable(e.to_string()));
            }
            FallbackPolicy::Placeholder => {
                warn!(%essay_id, error = %e, "grading failed; storing placeholder result");
                (placeholder_grade(), GradeSource::Fallback)
            }
        },
    };

    let feedback = EssayFeedback::from_grade(&grade, source);
    let graded = state
        .store
        .complete_grading(essay_id, &grade, &feedback)
        .await?;
    info!(
        %essay_id,
        final_score = grade.final_score,
        source = ?source,
        "essay corrected"
    );
    Ok(graded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::{NewUser, Role};
    use crate::grading::{CompetencyScore, Grade, GradingError, GradingGateway};
    use crate::store::{MemoryStore, Store};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedGrader(Grade);

    #[async_trait]
    impl GradingGateway for FixedGrader {
        async fn grade(&self, _req: &GradeRequest<'_>) -> Result<Grade, GradingError> {
            Ok(self.0.clone())
        }
    }

    struct DownGrader;

    #[async_trait]
    impl GradingGateway for DownGrader {
        async fn grade(&self, _req: &GradeRequest<'_>) -> Result<Grade, GradingError> {
            Err(GradingError::Unavailable("connection refused".into()))
        }
    }

    fn grade_of(scores: [i32; 5], final_score: i32) -> Grade {
        Grade {
            competencies: scores.map(|score| CompetencyScore {
                score,
                feedback: format!("scored {score}"),
            }),
            final_score,
            general_feedback: "ok".into(),
            suggestions: vec![],
        }
    }

    async fn user_with_credits(store: &MemoryStore, email: &str, credits: i32) -> Uuid {
        store
            .create_user(NewUser {
                email: email.into(),
                name: None,
                password_hash: "x".into(),
                role: Role::User,
                credits,
            })
            .await
            .unwrap()
            .id
    }

    fn essay(title: &str, theme: &str, content: &str) -> SubmitEssayRequest {
        SubmitEssayRequest {
            title: title.into(),
            theme: theme.into(),
            content: content.into(),
        }
    }

    fn long_content() -> String {
        "a".repeat(25)
    }

    #[tokio::test]
    async fn zero_credits_rejects_without_creating_an_essay() {
        let (state, store) = AppState::fake_with_store();
        let user_id = user_with_credits(&store, "a@b.co", 0).await;

        let err = submit_essay(&state, user_id, essay("T", "Th", &long_content()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientCredits));
        assert_eq!(store.essay_count().await, 0);
    }

    #[tokio::test]
    async fn submission_spends_exactly_one_credit() {
        let (state, store) = AppState::fake_with_store();
        let user_id = user_with_credits(&store, "a@b.co", 3).await;

        let saved = submit_essay(&state, user_id, essay("T", "Th", &long_content()))
            .await
            .unwrap();
        assert_eq!(saved.status, EssayStatus::Pending);
        assert_eq!(store.find_user(user_id).await.unwrap().unwrap().credits, 2);
        assert_eq!(store.essay_count().await, 1);
    }

    #[tokio::test]
    async fn submitted_essay_reads_back_unchanged() {
        let (state, store) = AppState::fake_with_store();
        let user_id = user_with_credits(&store, "a@b.co", 1).await;

        let saved = submit_essay(&state, user_id, essay("T", "Th", &long_content()))
            .await
            .unwrap();
        let fetched = get_essay(&state, user_id, saved.id).await.unwrap();
        assert_eq!(fetched.title, "T");
        assert_eq!(fetched.theme, "Th");
        assert_eq!(fetched.content, long_content());
        assert_eq!(fetched.status, EssayStatus::Pending);
        assert_eq!(fetched.final_score, None);
    }

    #[tokio::test]
    async fn validation_runs_before_any_credit_is_spent() {
        let (state, store) = AppState::fake_with_store();
        let user_id = user_with_credits(&store, "a@b.co", 1).await;

        for bad in [
            essay("", "Th", &long_content()),
            essay("T", "   ", &long_content()),
            essay("T", "Th", "too short"),
            essay(&"t".repeat(MAX_TITLE_CHARS + 1), "Th", &long_content()),
        ] {
            let err = submit_essay(&state, user_id, bad).await.unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }
        assert_eq!(store.find_user(user_id).await.unwrap().unwrap().credits, 1);
    }

    #[tokio::test]
    async fn other_users_essays_are_not_found() {
        let (state, store) = AppState::fake_with_store();
        let owner = user_with_credits(&store, "owner@b.co", 1).await;
        let other = user_with_credits(&store, "other@b.co", 1).await;
        let saved = submit_essay(&state, owner, essay("T", "Th", &long_content()))
            .await
            .unwrap();

        assert!(matches!(
            get_essay(&state, other, saved.id).await,
            Err(ApiError::EssayNotFound)
        ));
        assert!(matches!(
            grade_essay(&state, other, saved.id).await,
            Err(ApiError::EssayNotFound)
        ));
    }

    #[tokio::test]
    async fn submit_then_grade_with_900() {
        let (state, store) = AppState::fake_with_store();
        let state = state.with_grader(FixedGrader(grade_of([180; 5], 900)));
        let user_id = user_with_credits(&store, "a@b.co", 1).await;

        let saved = submit_essay(&state, user_id, essay("T", "Th", &long_content()))
            .await
            .unwrap();
        assert_eq!(store.find_user(user_id).await.unwrap().unwrap().credits, 0);

        let graded = grade_essay(&state, user_id, saved.id).await.unwrap();
        assert_eq!(graded.status, EssayStatus::Corrected);
        assert_eq!(graded.final_score, Some(900));
        assert_eq!(graded.competency_scores, [Some(180); 5]);
        assert!(graded.corrected_at.is_some());
        let feedback = graded.feedback.expect("feedback stored");
        assert_eq!(feedback.source, GradeSource::Model);
        assert_eq!(feedback.competencies.len(), 5);
    }

    #[tokio::test]
    async fn second_grading_is_rejected() {
        let (state, store) = AppState::fake_with_store();
        let user_id = user_with_credits(&store, "a@b.co", 1).await;
        let saved = submit_essay(&state, user_id, essay("T", "Th", &long_content()))
            .await
            .unwrap();

        let first = grade_essay(&state, user_id, saved.id).await.unwrap();
        let second = grade_essay(&state, user_id, saved.id).await.unwrap_err();
        assert!(matches!(second, ApiError::EssayAlreadyCorrected));

        let stored = store.find_essay(saved.id).await.unwrap().unwrap();
        assert_eq!(stored.final_score, first.final_score);
        assert_eq!(stored.corrected_at, first.corrected_at);
    }

    #[tokio::test]
    async fn admin_may_grade_someone_elses_essay() {
        let (state, store) = AppState::fake_with_store();
        let owner = user_with_credits(&store, "owner@b.co", 1).await;
        let admin = store
            .create_user(NewUser {
                email: "admin@b.co".into(),
                name: None,
                password_hash: "x".into(),
                role: Role::Admin,
                credits: 0,
            })
            .await
            .unwrap();
        let saved = submit_essay(&state, owner, essay("T", "Th", &long_content()))
            .await
            .unwrap();

        let graded = grade_essay(&state, admin.id, saved.id).await.unwrap();
        assert_eq!(graded.user_id, owner);
        assert_eq!(graded.feedback.unwrap().source, GradeSource::Placeholder);
    }

    #[tokio::test]
    async fn grader_outage_leaves_essay_pending_by_default() {
        let (state, store) = AppState::fake_with_store();
        let state = state.with_grader(DownGrader);
        let user_id = user_with_credits(&store, "a@b.co", 1).await;
        let saved = submit_essay(&state, user_id, essay("T", "Th", &long_content()))
            .await
            .unwrap();

        let err = grade_essay(&state, user_id, saved.id).await.unwrap_err();
        assert!(matches!(err, ApiError::GradingUnavailable(_)));
        let stored = store.find_essay(saved.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EssayStatus::Pending);
        assert_eq!(stored.final_score, None);
        assert_eq!(store.find_user(user_id).await.unwrap().unwrap().credits, 0);
    }

    #[tokio::test]
    async fn placeholder_policy_stores_fallback_result() {
        let (state, store) = AppState::fake_with_store();
        let state = state
            .with_grader(DownGrader)
            .with_config(|cfg| cfg.grading.fallback = FallbackPolicy::Placeholder);
        let user_id = user_with_credits(&store, "a@b.co", 1).await;
        let saved = submit_essay(&state, user_id, essay("T", "Th", &long_content()))
            .await
            .unwrap();

        let graded = grade_essay(&state, user_id, saved.id).await.unwrap();
        assert_eq!(graded.final_score, Some(900));
        assert_eq!(graded.feedback.unwrap().source, GradeSource::Fallback);
    }

    #[tokio::test]
    async fn out_of_range_grade_counts_as_failure() {
        let (state, store) = AppState::fake_with_store();
        let state = state.with_grader(FixedGrader(grade_of([180, 180, 250, 180, 180], 970)));
        let user_id = user_with_credits(&store, "a@b.co", 1).await;
        let saved = submit_essay(&state, user_id, essay("T", "Th", &long_content()))
            .await
            .unwrap();

        let err = grade_essay(&state, user_id, saved.id).await.unwrap_err();
        assert!(matches!(err, ApiError::GradingUnavailable(_)));
    }

    #[tokio::test]
    async fn concurrent_submissions_admit_one_per_credit() {
        let (state, store) = AppState::fake_with_store();
        let user_id = user_with_credits(&store, "a@b.co", 1).await;
        let state = Arc::new(state);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let state = state.clone();
                tokio::spawn(async move {
                    submit_essay(&state, user_id, essay(&format!("T{i}"), "Th", &long_content()))
                        .await
                })
            })
            .collect();

        let mut admitted = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) => assert!(matches!(e, ApiError::InsufficientCredits)),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(store.essay_count().await, 1);
        assert_eq!(store.find_user(user_id).await.unwrap().unwrap().credits, 0);
    }

    #[tokio::test]
    async fn list_is_owner_scoped_and_clamped() {
        let (state, store) = AppState::fake_with_store();
        let user_id = user_with_credits(&store, "a@b.co", 3).await;
        let other = user_with_credits(&store, "c@d.co", 1).await;
        for t in ["one", "two", "three"] {
            submit_essay(&state, user_id, essay(t, "Th", &long_content()))
                .await
                .unwrap();
        }
        submit_essay(&state, other, essay("theirs", "Th", &long_content()))
            .await
            .unwrap();

        let all = list_essays(&state, user_id, &Pagination::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].title, "three");

        let page = list_essays(&state, user_id, &Pagination { limit: 0, offset: 1 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "two");
    }
}
