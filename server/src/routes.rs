use axum::routing::{get, post, put};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::auth::account;
use crate::books::{catalog, crud, transfer};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 5 requests per minute per IP on credential endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5) // Allow burst of 5
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let auth_routes = Router::new()
        .route("/register", post(account::register))
        .route("/login", post(account::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    let session_routes = Router::new()
        .route("/", get(account::home))
        .route("/dashboard", get(account::dashboard))
        .route("/logout", post(account::logout));

    // Book API (session cookie required, CurrentUser extractor validates it)
    let book_routes = Router::new()
        .route("/api/books", get(crud::list_books).post(crud::create_book))
        .route(
            "/api/books/{id}",
            put(crud::update_book).delete(crud::delete_book),
        )
        .route("/api/book", post(crud::publish_book))
        .route("/api/export-books", get(transfer::export_books))
        .route(
            "/api/import-books",
            get(catalog::import_from_catalog).post(transfer::import_from_csv),
        );

    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", get(health_check));

    let static_dir = Path::new(&state.static_dir);
    let static_routes = Router::new()
        .nest_service("/static", ServeDir::new(static_dir))
        .route_service("/favicon.ico", ServeFile::new(static_dir.join("favicon.ico")));

    Router::new()
        .merge(auth_routes)
        .merge(session_routes)
        .merge(book_routes)
        .merge(ws_routes)
        .merge(health)
        .merge(static_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
