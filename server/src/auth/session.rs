//! Server-side cookie sessions.
//!
//! The client holds a random token in the `session` cookie; only its
//! SHA-256 digest is stored, so a leaked database cannot be replayed.

use axum::http::{header, HeaderMap};
use chrono::{SecondsFormat, Utc};
use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::db::DbPool;
use crate::state::SessionSettings;

pub const SESSION_COOKIE: &str = "session";

/// User resolved from a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
}

// Fixed-width UTC timestamps so stored values compare correctly as text.
fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Generate a session token. Returns (token, sha256_hash_hex).
pub fn generate_session_token() -> (String, String) {
    let token_bytes: [u8; 32] = rand::rng().random();
    let token = hex::encode(token_bytes);
    let hash = hash_session_token(&token);
    (token, hash)
}

/// SHA-256 hash of a session token for storage comparison.
pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Start a session for `user_id` and return the plaintext token.
pub fn create_session(
    conn: &Connection,
    user_id: i64,
    ttl: chrono::Duration,
) -> rusqlite::Result<String> {
    let (token, token_hash) = generate_session_token();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO sessions (user_id, token_hash, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, token_hash, timestamp(now), timestamp(now + ttl)],
    )?;

    Ok(token)
}

/// Resolve a token to its user if the session exists and has not expired.
pub fn lookup_session(conn: &Connection, token: &str) -> rusqlite::Result<Option<SessionUser>> {
    conn.query_row(
        "SELECT u.id, u.username FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token_hash = ?1 AND s.expires_at > ?2",
        params![hash_session_token(token), timestamp(Utc::now())],
        |row| {
            Ok(SessionUser {
                user_id: row.get(0)?,
                username: row.get(1)?,
            })
        },
    )
    .optional()
}

/// Delete the session for `token`. Returns false if none existed.
pub fn delete_session(conn: &Connection, token: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        [hash_session_token(token)],
    )?;
    Ok(rows > 0)
}

pub fn delete_expired_sessions(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        [timestamp(Utc::now())],
    )
}

/// Extract the session token from the request's Cookie header(s).
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|c| c.ok())
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|value| !value.is_empty())
}

fn base_cookie(
    value: String,
    max_age: CookieDuration,
    settings: &SessionSettings,
) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookies)
        .max_age(max_age)
        .build()
}

/// Set-Cookie value carrying a fresh session token.
pub fn session_cookie(token: &str, settings: &SessionSettings) -> String {
    let max_age = CookieDuration::seconds(settings.ttl.num_seconds());
    base_cookie(token.to_owned(), max_age, settings).to_string()
}

/// Set-Cookie value that removes the session cookie.
pub fn clear_session_cookie(settings: &SessionSettings) -> String {
    base_cookie(String::new(), CookieDuration::ZERO, settings).to_string()
}

/// Spawn a background task that periodically purges expired sessions.
pub fn spawn_session_sweeper(db: DbPool, interval_secs: u64) {
    let interval = std::time::Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let db_clone = db.clone();
            let result = tokio::task::spawn_blocking(move || {
                let conn = db_clone
                    .lock()
                    .map_err(|e| format!("DB lock error: {}", e))?;
                delete_expired_sessions(&conn).map_err(|e| e.to_string())
            })
            .await;

            match result {
                Ok(Ok(count)) if count > 0 => {
                    tracing::info!("Session cleanup: purged {} expired sessions", count);
                }
                Ok(Ok(_)) => {
                    tracing::debug!("Session cleanup: no expired sessions");
                }
                Ok(Err(e)) => {
                    tracing::error!("Session cleanup error: {}", e);
                }
                Err(e) => {
                    tracing::error!("Session cleanup task join error: {}", e);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use axum::http::HeaderValue;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrations::migrations().to_latest(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES ('alice', 'x', '2024-01-01')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_token_hash_is_deterministic() {
        let (token, hash) = generate_session_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash, hash_session_token(&token));
        assert_ne!(hash, token);
    }

    #[test]
    fn test_session_lifecycle() {
        let conn = test_conn();
        let token = create_session(&conn, 1, chrono::Duration::hours(1)).unwrap();

        let user = lookup_session(&conn, &token).unwrap().unwrap();
        assert_eq!(user.username, "alice");

        assert!(delete_session(&conn, &token).unwrap());
        assert!(lookup_session(&conn, &token).unwrap().is_none());
        assert!(!delete_session(&conn, &token).unwrap());
    }

    #[test]
    fn test_expired_session_is_rejected_and_swept() {
        let conn = test_conn();
        let token = create_session(&conn, 1, chrono::Duration::hours(-1)).unwrap();

        assert!(lookup_session(&conn, &token).unwrap().is_none());
        assert_eq!(delete_expired_sessions(&conn).unwrap(), 1);
    }

    #[test]
    fn test_token_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; other=1"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc123"));

        let mut split = HeaderMap::new();
        split.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        split.append(header::COOKIE, HeaderValue::from_static("session=def456"));
        assert_eq!(token_from_headers(&split).as_deref(), Some("def456"));

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(token_from_headers(&empty), None);
        assert_eq!(token_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let settings = SessionSettings {
            ttl: chrono::Duration::hours(2),
            secure_cookies: true,
        };
        let cookie = Cookie::parse(session_cookie("tok", &settings)).unwrap();
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(CookieDuration::hours(2)));

        let cleared = clear_session_cookie(&SessionSettings::default());
        assert!(cleared.starts_with("session=;"));
        assert!(cleared.contains("Max-Age=0"));
        assert!(!cleared.contains("Secure"));
    }
}
