use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::entities::{question, user};
use crate::models::polls::{
    ChoiceTally, ChoiceView, PollIndexView, QuestionDetailView, QuestionResultsView,
    QuestionSummary, VoteForm, VoteReceipt,
};
use crate::polls::{PollError, store};
use crate::state::AppState;

use super::{CurrentUser, HttpError, RequireUser};

const NO_POLLS_NOTICE: &str = "No polls are available.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/polls/", get(index))
        .route("/polls/{question_id}/", get(detail))
        .route("/polls/{question_id}/results/", get(results))
        .route("/polls/{question_id}/vote/", post(vote))
}

pub fn results_path(question_id: i32) -> String {
    format!("/polls/{question_id}/results/")
}

async fn index(State(state): State<AppState>) -> Result<Json<PollIndexView>, HttpError> {
    let now = Utc::now();
    let questions = store::latest_published(&state.database, now).await?;

    let latest_question_list = questions
        .iter()
        .map(|question| QuestionSummary::from_model(question, now))
        .collect::<Vec<_>>();
    let notice = latest_question_list
        .is_empty()
        .then(|| NO_POLLS_NOTICE.to_string());

    Ok(Json(PollIndexView {
        latest_question_list,
        notice,
    }))
}

async fn detail(
    Path(question_id): Path<i32>,
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<QuestionDetailView>, HttpError> {
    let now = Utc::now();
    let question = store::open_question(&state.database, question_id, now).await?;
    let view = detail_view(&state, &question, user.as_ref(), now, None).await?;
    Ok(Json(view))
}

async fn results(
    Path(question_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<QuestionResultsView>, HttpError> {
    let now = Utc::now();
    let question = store::published_question(&state.database, question_id, now).await?;

    let tallies = match state.cache.results(question.id).await {
        Some(cached) => cached,
        None => {
            let generation = state.cache.generation();
            let fresh = Arc::new(store::tally(&state.database, question.id).await?);
            state
                .cache
                .store_results(question.id, generation, Arc::clone(&fresh))
                .await;
            fresh
        }
    };

    let total_votes = tallies.iter().map(|entry| entry.votes).sum::<i64>();
    assert!(total_votes >= 0, "Total votes cannot be negative");

    Ok(Json(QuestionResultsView {
        question: QuestionSummary::from_model(&question, now),
        results: tallies.iter().cloned().collect::<Vec<ChoiceTally>>(),
        total_votes,
    }))
}

async fn vote(
    Path(question_id): Path<i32>,
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Form(form): Form<VoteForm>,
) -> Result<Response, HttpError> {
    let now = Utc::now();
    let question = store::open_question(&state.database, question_id, now).await?;

    match store::cast_vote(&state.database, user.id, &question, form.choice.as_deref()).await {
        Ok(ballot) => {
            state.cache.ballot_saved(question.id).await;
            info!(
                "User {} voted for choice {} on question {}",
                user.username, ballot.choice.id, question.id
            );

            let results_url = results_path(question.id);
            let receipt = VoteReceipt {
                question_id: question.id,
                choice: ChoiceView::from(&ballot.choice),
                message: ballot.confirmation(),
                results_url: results_url.clone(),
            };
            Ok((StatusCode::SEE_OTHER, [(LOCATION, results_url)], Json(receipt)).into_response())
        }
        Err(PollError::MissingSelection) => {
            let message = PollError::MissingSelection.to_string();
            let view = detail_view(&state, &question, Some(&user), now, Some(message)).await?;
            Ok((StatusCode::BAD_REQUEST, Json(view)).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

async fn detail_view(
    state: &AppState,
    question: &question::Model,
    user: Option<&user::Model>,
    now: DateTime<Utc>,
    error_message: Option<String>,
) -> Result<QuestionDetailView, HttpError> {
    let choices = store::choices_for(&state.database, question.id).await?;
    let voted = match user {
        Some(user) => store::prior_choice(&state.database, user.id, question.id).await?,
        None => None,
    };

    Ok(QuestionDetailView {
        question: QuestionSummary::from_model(question, now),
        choices: choices.iter().map(ChoiceView::from).collect(),
        voted: voted.as_ref().map(ChoiceView::from),
        error_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{HeaderMap, Request, header::CONTENT_TYPE};
    use sea_orm::{DatabaseConnection, EntityTrait};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::CacheConfig;
    use crate::entities::vote;
    use crate::http::{USER_HEADER, router as app_router};
    use crate::state::PollCache;
    use crate::testing::{database, question_offset};

    struct Harness {
        app: Router,
        db: DatabaseConnection,
    }

    impl Harness {
        async fn new() -> Self {
            let db = database().await;
            let cache = Arc::new(PollCache::new(&CacheConfig::default()));
            let app = app_router(AppState::new(db.clone(), cache));
            Self { app, db }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
            let response = self
                .app
                .clone()
                .oneshot(request)
                .await
                .expect("router responds");
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("body collects");
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).expect("json body")
            };
            (status, headers, body)
        }

        async fn get(&self, uri: &str, username: Option<&str>) -> (StatusCode, HeaderMap, Value) {
            let mut builder = Request::builder().uri(uri);
            if let Some(name) = username {
                builder = builder.header(USER_HEADER, name);
            }
            self.send(builder.body(Body::empty()).expect("request"))
                .await
        }

        async fn post_vote(
            &self,
            question_id: i32,
            username: Option<&str>,
            form: &str,
        ) -> (StatusCode, HeaderMap, Value) {
            let mut builder = Request::builder()
                .method("POST")
                .uri(format!("/polls/{question_id}/vote/"))
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
            if let Some(name) = username {
                builder = builder.header(USER_HEADER, name);
            }
            self.send(builder.body(Body::from(form.to_string())).expect("request"))
                .await
        }

        async fn votes(&self) -> Vec<vote::Model> {
            vote::Entity::find().all(&self.db).await.expect("votes load")
        }
    }

    fn question_texts(body: &Value) -> Vec<String> {
        body["latest_question_list"]
            .as_array()
            .expect("question list")
            .iter()
            .map(|entry| entry["question_text"].as_str().expect("text").to_string())
            .collect()
    }

    #[tokio::test]
    async fn index_without_questions_shows_notice() {
        let harness = Harness::new().await;
        let (status, _, body) = harness.get("/polls/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notice"], NO_POLLS_NOTICE);
        assert!(question_texts(&body).is_empty());
    }

    #[tokio::test]
    async fn index_lists_only_past_questions() {
        let harness = Harness::new().await;
        question_offset(&harness.db, "Past question.", -30, None).await;
        question_offset(&harness.db, "Future question.", 30, None).await;

        let (status, _, body) = harness.get("/polls/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(question_texts(&body), vec!["Past question."]);
        assert!(body["notice"].is_null());
    }

    #[tokio::test]
    async fn index_orders_newest_first() {
        let harness = Harness::new().await;
        question_offset(&harness.db, "Past question 1.", -30, None).await;
        question_offset(&harness.db, "Past question 2.", -5, None).await;

        let (_, _, body) = harness.get("/polls/", None).await;
        assert_eq!(
            question_texts(&body),
            vec!["Past question 2.", "Past question 1."]
        );
    }

    #[tokio::test]
    async fn detail_redirects_for_future_question() {
        let harness = Harness::new().await;
        let future = question_offset(&harness.db, "Future question.", 5, None).await;

        let (status, headers, body) = harness.get(&format!("/polls/{}/", future.id), None).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[LOCATION], "/polls/");
        assert_eq!(
            body["error"],
            format!("Poll number {} is already closed.", future.id)
        );
    }

    #[tokio::test]
    async fn detail_redirects_for_missing_question() {
        let harness = Harness::new().await;
        let (status, headers, body) = harness.get("/polls/42/", None).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[LOCATION], "/polls/");
        assert_eq!(body["error"], "Poll number 42 does not exist.");
        assert_eq!(body["redirect"], "/polls/");
    }

    #[tokio::test]
    async fn detail_shows_past_question_and_prior_vote() {
        let harness = Harness::new().await;
        let alice = store::register_user(&harness.db, "alice", Utc::now())
            .await
            .expect("user");
        let question = question_offset(&harness.db, "Past Question.", -5, None).await;
        let pizza = store::add_choice(&harness.db, question.id, "Pizza")
            .await
            .expect("choice");
        store::cast_vote(&harness.db, alice.id, &question, Some(&pizza.id.to_string()))
            .await
            .expect("ballot");

        let uri = format!("/polls/{}/", question.id);
        let (status, _, anonymous) = harness.get(&uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(anonymous["question"]["question_text"], "Past Question.");
        assert_eq!(anonymous["choices"][0]["choice_text"], "Pizza");
        assert!(anonymous["voted"].is_null());

        let (_, _, signed_in) = harness.get(&uri, Some("alice")).await;
        assert_eq!(signed_in["voted"]["id"], pizza.id);
    }

    #[tokio::test]
    async fn results_redirect_for_unpublished_question() {
        let harness = Harness::new().await;
        let future = question_offset(&harness.db, "Future question.", 5, None).await;
        let (status, headers, _) = harness
            .get(&format!("/polls/{}/results/", future.id), None)
            .await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[LOCATION], "/polls/");
    }

    #[tokio::test]
    async fn vote_requires_authentication() {
        let harness = Harness::new().await;
        let question = question_offset(&harness.db, "Lunch?", -1, None).await;
        let pizza = store::add_choice(&harness.db, question.id, "Pizza")
            .await
            .expect("choice");

        let form = format!("choice={}", pizza.id);
        let (status, _, _) = harness.post_vote(question.id, None, &form).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = harness.post_vote(question.id, Some("mallory"), &form).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(harness.votes().await.is_empty());
    }

    #[tokio::test]
    async fn vote_without_choice_redisplays_detail() {
        let harness = Harness::new().await;
        store::register_user(&harness.db, "alice", Utc::now())
            .await
            .expect("user");
        let question = question_offset(&harness.db, "Lunch?", -1, None).await;
        store::add_choice(&harness.db, question.id, "Pizza")
            .await
            .expect("choice");

        let (status, headers, body) = harness.post_vote(question.id, Some("alice"), "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(headers.get(LOCATION).is_none());
        assert_eq!(body["error_message"], "You didn't select a choice.");
        assert_eq!(body["question"]["id"], question.id);
        assert!(harness.votes().await.is_empty());
    }

    #[tokio::test]
    async fn revote_keeps_single_ballot_and_refreshes_results() {
        let harness = Harness::new().await;
        let alice = store::register_user(&harness.db, "alice", Utc::now())
            .await
            .expect("user");
        let question = question_offset(&harness.db, "Lunch?", -1, None).await;
        let pizza = store::add_choice(&harness.db, question.id, "Pizza")
            .await
            .expect("choice");
        let salad = store::add_choice(&harness.db, question.id, "Salad")
            .await
            .expect("choice");

        let (status, headers, body) = harness
            .post_vote(question.id, Some("alice"), &format!("choice={}", pizza.id))
            .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[LOCATION], results_path(question.id).as_str());
        assert_eq!(body["message"], "Your vote for 'Pizza' has been saved.");

        let results_uri = results_path(question.id);
        let (_, _, first_results) = harness.get(&results_uri, None).await;
        assert_eq!(first_results["results"][0]["votes"], 1);
        assert_eq!(first_results["total_votes"], 1);

        let (status, _, body) = harness
            .post_vote(question.id, Some("alice"), &format!("choice={}", salad.id))
            .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(body["choice"]["choice_text"], "Salad");

        let ballots = harness.votes().await;
        assert_eq!(ballots.len(), 1);
        assert_eq!(ballots[0].user_id, alice.id);
        assert_eq!(ballots[0].choice_id, salad.id);

        let (_, _, second_results) = harness.get(&results_uri, None).await;
        assert_eq!(second_results["results"][0]["votes"], 0);
        assert_eq!(second_results["results"][1]["votes"], 1);
        assert_eq!(second_results["total_votes"], 1);
    }

    #[tokio::test]
    async fn vote_on_expired_question_is_rejected() {
        let harness = Harness::new().await;
        store::register_user(&harness.db, "alice", Utc::now())
            .await
            .expect("user");
        let expired = question_offset(&harness.db, "Expired Question", -5, Some(4)).await;
        let pizza = store::add_choice(&harness.db, expired.id, "Pizza")
            .await
            .expect("choice");

        let (status, headers, body) = harness
            .post_vote(expired.id, Some("alice"), &format!("choice={}", pizza.id))
            .await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[LOCATION], "/polls/");
        assert_eq!(
            body["error"],
            format!("Poll number {} is already closed.", expired.id)
        );
        assert!(harness.votes().await.is_empty());
    }

    #[tokio::test]
    async fn health_reports_ready() {
        let harness = Harness::new().await;
        let (status, _, body) = harness.get("/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn health_reports_live() {
        let harness = Harness::new().await;
        let (status, _, body) = harness.get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "live");
        assert!(body["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn results_redirect_after_end_date() {
        let harness = Harness::new().await;
        let expired = question_offset(&harness.db, "Expired Question", -5, Some(4)).await;
        store::add_choice(&harness.db, expired.id, "Pizza")
            .await
            .expect("choice");

        let (status, headers, body) = harness
            .get(&results_path(expired.id), None)
            .await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[LOCATION], "/polls/");
        assert_eq!(
            body["error"],
            format!("Poll number {} is already closed.", expired.id)
        );
    }

    #[tokio::test]
    async fn results_redirect_for_missing_question() {
        let harness = Harness::new().await;
        let (status, headers, body) = harness.get(&results_path(42), None).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[LOCATION], "/polls/");
        assert_eq!(body["error"], "Poll number 42 does not exist.");
    }

    #[tokio::test]
    async fn vote_on_missing_question_redirects() {
        let harness = Harness::new().await;
        store::register_user(&harness.db, "alice", Utc::now())
            .await
            .expect("user");

        let (status, headers, body) = harness.post_vote(42, Some("alice"), "choice=1").await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[LOCATION], "/polls/");
        assert_eq!(body["error"], "Poll number 42 does not exist.");
        assert!(harness.votes().await.is_empty());
    }
}
