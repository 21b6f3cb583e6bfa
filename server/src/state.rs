use std::time::Duration;

use crate::books::catalog::CatalogClient;
use crate::db::DbPool;
use crate::ws::broadcast::Notifier;
use crate::ws::ConnectionRegistry;

/// Session cookie settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Session lifetime
    pub ttl: chrono::Duration,
    /// Add the Secure attribute to the session cookie
    pub secure_cookies: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::hours(168),
            secure_cookies: false,
        }
    }
}

/// WebSocket keepalive timing.
#[derive(Debug, Clone, Copy)]
pub struct Keepalive {
    /// Time between pings
    pub interval: Duration,
    /// How long a client has to answer each ping
    pub pong_timeout: Duration,
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// Live WebSocket clients
    pub connections: ConnectionRegistry,
    /// Producer side of the live update channel
    pub notifier: Notifier,
    /// External catalog used by the import endpoint
    pub catalog: CatalogClient,
    /// Session cookie settings
    pub sessions: SessionSettings,
    /// Keepalive for WebSocket clients, None disables
    pub keepalive: Option<Keepalive>,
    /// Directory served under /static
    pub static_dir: String,
}
