//! Caller identity as asserted by the fronting auth proxy.
//!
//! The proxy authenticates the session and forwards the username in
//! [`USER_HEADER`]. Usernames unknown to this service are treated as
//! anonymous.

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use tracing::warn;

use crate::entities::user;
use crate::polls::store;
use crate::state::AppState;

use super::HttpError;

pub const USER_HEADER: &str = "x-poll-user";

/// The signed-in user, if any.
pub struct CurrentUser(pub Option<user::Model>);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_HEADER) else {
            return Ok(Self(None));
        };

        let username = raw
            .to_str()
            .map_err(|_| {
                HttpError::new(
                    StatusCode::BAD_REQUEST,
                    format!("{USER_HEADER} header must be visible ASCII"),
                )
            })?
            .trim()
            .to_string();
        if username.is_empty() {
            return Ok(Self(None));
        }

        let user = store::find_user_by_name(&state.database, &username).await?;
        if user.is_none() {
            warn!("Auth proxy forwarded unknown user {username}");
        }
        Ok(Self(user))
    }
}

/// Rejects anonymous callers with `401 Unauthorized`.
pub struct RequireUser(pub user::Model);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        user.map(Self).ok_or_else(|| {
            HttpError::new(
                StatusCode::UNAUTHORIZED,
                "You must be signed in to vote.".to_string(),
            )
        })
    }
}
