use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use sea_orm::DbErr;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::polls::PollError;
use crate::state::AppState;

mod auth;
mod polls;

pub use auth::{CurrentUser, RequireUser, USER_HEADER};

/// Where failed lookups and closed polls send the caller.
pub const INDEX_PATH: &str = "/polls/";

pub fn router(state: AppState) -> Router {
    assert!(
        state.start_time.elapsed() < Duration::from_secs(86_400),
        "Application uptime exceeds 24 hours before router creation"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, HeaderName::from_static(USER_HEADER)])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .merge(polls::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .database
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let response = ReadyResponse {
        status: "ready",
        cache_entries: CacheSummary {
            results: state.cache.results_entries(),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    cache_entries: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    results: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    redirect: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self {
            status,
            message,
            redirect: None,
        }
    }

    /// A `302 Found` pointing the caller at `location` with a message to show there.
    pub fn redirect(location: &str, message: String) -> Self {
        assert!(location.starts_with('/'), "Redirects must stay on this host");
        let mut error = Self::new(StatusCode::FOUND, message);
        error.redirect = Some(location.to_string());
        error
    }
}

impl From<PollError> for HttpError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::NotFound(_) | PollError::Closed(_) => {
                HttpError::redirect(INDEX_PATH, err.to_string())
            }
            PollError::MissingSelection | PollError::InvalidInput(_) => {
                HttpError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            PollError::Database(db_err) => db_err.into(),
        }
    }
}

impl From<DbErr> for HttpError {
    fn from(err: DbErr) -> Self {
        HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
            redirect: self.redirect.clone(),
        });
        match self.redirect {
            Some(location) => (self.status, [(LOCATION, location)], body).into_response(),
            None => (self.status, body).into_response(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}
