use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use rusqlite::{ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::resolve_session;
use crate::auth::password::{self, MIN_PASSWORD_LEN};
use crate::auth::session;
use crate::db::models::User;
use crate::db::with_conn;
use crate::error::AppError;
use crate::state::AppState;

/// Maximum username length in characters.
const MAX_USERNAME_LEN: usize = 64;

/// Landing page of the bundled web client.
const INDEX_PAGE: &str = "/static/index.html";

// --- Request/response types ---

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
}

fn validate_credentials(creds: &Credentials) -> Result<String, AppError> {
    let username = creds.username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::bad_request(format!(
            "Username must be 1-{} characters",
            MAX_USERNAME_LEN
        )));
    }
    if creds.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(username.to_string())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// --- Handlers ---

/// POST /register
/// Create an account.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<StatusCode, AppError> {
    let username = validate_credentials(&req)?;

    // Argon2 is CPU-bound, run it on the blocking pool
    let plain = req.password;
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain)).await??;

    let name = username.clone();
    let user_id = with_conn(&state.db, move |conn| {
        match conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, password_hash, Utc::now().to_rfc3339()],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::Conflict("Username already taken".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    })
    .await?;

    tracing::info!(user_id, username = %username, "User registered");
    Ok(StatusCode::CREATED)
}

/// POST /login
/// Verify credentials and start a cookie session.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<Response, AppError> {
    let username = req.username.trim().to_string();

    let user = with_conn(&state.db, move |conn| {
        Ok(conn
            .query_row(
                "SELECT id, username, password_hash FROM users WHERE username = ?1",
                [&username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                    })
                },
            )
            .optional()?)
    })
    .await?;

    let Some(user) = user else {
        tracing::warn!("Login failed: unknown user");
        return Err(AppError::Unauthorized);
    };

    let plain = req.password;
    let stored_hash = user.password_hash.clone();
    let valid =
        tokio::task::spawn_blocking(move || password::verify_password(&plain, &stored_hash))
            .await??;
    if !valid {
        tracing::warn!(user_id = user.id, "Login failed: wrong password");
        return Err(AppError::Unauthorized);
    }

    let ttl = state.sessions.ttl;
    let user_id = user.id;
    let token = with_conn(&state.db, move |conn| {
        Ok(session::create_session(conn, user_id, ttl)?)
    })
    .await?;

    tracing::info!(user_id, "User logged in");

    let cookie = session::session_cookie(&token, &state.sessions);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            user_id: user.id,
            username: user.username,
        }),
    )
        .into_response())
}

/// POST /logout
/// End the current session, if any, and clear the cookie.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(token) = session::token_from_headers(&headers) {
        let removed = with_conn(&state.db, move |conn| {
            Ok(session::delete_session(conn, &token)?)
        })
        .await?;
        if removed {
            tracing::info!("User logged out");
        }
    }

    let cookie = session::clear_session_cookie(&state.sessions);
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]).into_response())
}

/// GET /dashboard
/// Send logged-in users to the web client, others home.
pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Redirect, AppError> {
    match resolve_session(&state, &headers).await? {
        Some(_) => Ok(Redirect::to(INDEX_PAGE)),
        None => Ok(Redirect::to("/")),
    }
}

/// GET /
/// Redirect to the bundled web client.
pub async fn home() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, INDEX_PAGE)]).into_response()
}
