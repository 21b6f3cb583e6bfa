use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::auth::session::{self, SessionUser};
use crate::db::with_conn;
use crate::error::AppError;
use crate::state::AppState;

/// Logged-in user resolved from the `session` cookie.
/// Implements axum's FromRequestParts for use as an extractor; rejects with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: i64,
    pub username: String,
}

impl From<SessionUser> for CurrentUser {
    fn from(user: SessionUser) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
        }
    }
}

/// Resolve the session cookie in `headers`, if any, to its user.
pub async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<CurrentUser>, AppError> {
    let Some(token) = session::token_from_headers(headers) else {
        return Ok(None);
    };

    let user = with_conn(&state.db, move |conn| {
        Ok(session::lookup_session(conn, &token)?)
    })
    .await?;

    Ok(user.map(CurrentUser::from))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve_session(state, &parts.headers)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}
